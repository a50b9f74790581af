pub mod checksum;
mod client;
pub mod dispatch;
mod error;
pub mod item;
pub mod links;
pub mod progress;

pub use client::SessionClient;
pub use dispatch::{delete_batch, download_batch, upload_batch};
pub use error::ClientError;
pub use item::WorkItem;
