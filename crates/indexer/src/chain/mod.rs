//! Chain access: the gateway capability, its RPC implementation, and an
//! in-memory fake for tests.

pub mod fake;
pub mod gateway;
pub mod rpc;

pub use fake::FakeGateway;
pub use gateway::{
    ChainError, ChainGateway, FetchedLog, NodeInfo, RawHeader, TransactionRecord,
};
pub use rpc::RpcGateway;
