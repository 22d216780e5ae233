mod handlers;
pub mod memory;
mod model;
pub mod normalize;
mod repo;
mod store;

use axum::Router;

use crate::state::AppState;

pub use handlers::DEFAULT_RECENT_LIMIT;
pub use model::{NewRecord, NutritionRecord};
pub use repo::{PgRecordRepository, RecordRepository, StoreError};
pub use store::RecordStore;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::record_routes())
        .merge(handlers::upload_routes(max_upload_bytes))
}
