pub mod data_client;
pub mod order_client;

pub use data_client::DataClient;
pub use order_client::{ClobOrderClient, DryRunOrderClient, OrderClient, OrderReceipt, OrderRequest};
