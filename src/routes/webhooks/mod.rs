mod checkout;
mod pix;

use crate::app_state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(checkout::router())
        .merge(pix::router())
}
