//! Gateway: one HTTP port serving the chat WebSocket, image upload/delete, and the
//! stored images themselves.

mod protocol;
mod server;
mod uploads;

pub use protocol::{ApiError, DeleteImageRequest, UploadResponse};
pub use server::{build_router, run_gateway, GatewayState};
