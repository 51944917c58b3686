pub mod client;
pub mod responses;

pub use client::{KeysApiClient, KeysApiConfig, FETCH_REQUEST_TIMEOUT, MIN_KAPI_VERSION};
pub use responses::{
    ElBlockSnapshot, KeysResponse, Meta, OperatorsEntry, OperatorsResponse, StatusResponse,
};
