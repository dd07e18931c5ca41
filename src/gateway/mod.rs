pub mod ordered;
pub mod polling;
pub mod webhook;

use tracing::debug;

use crate::handler::MessageHandler;
use crate::platform::{Flavor, Update};

/// Which update flavors reach the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AllFlavors,
    ChatOnly,
}

impl Route {
    pub fn accepts(&self, flavor: &Flavor) -> bool {
        match self {
            Route::AllFlavors => true,
            Route::ChatOnly => *flavor == Flavor::Chat,
        }
    }
}

/// Hand one update to the handler if the route accepts its flavor.
/// Returns whether the handler ran.
pub async fn dispatch(update: Update, route: Route, handler: &dyn MessageHandler) -> bool {
    if !route.accepts(&update.flavor) {
        debug!(
            "Skipping update {} with unrouted flavor {}",
            update.update_id, update.flavor
        );
        return false;
    }

    debug!("Dispatching update {} ({})", update.update_id, update.flavor);
    handler.handle(update.message).await;
    true
}
