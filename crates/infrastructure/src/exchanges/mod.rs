//! 券商网关模块
//!
//! 实现各个券商的网关，统一接口

mod factory;
mod okx_gateway;
mod paper_gateway;

pub use factory::BrokerGatewayFactory;
pub use okx_gateway::{sign_request, OkxBrokerGateway};
pub use paper_gateway::PaperBrokerGateway;
