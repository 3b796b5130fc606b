mod client;
pub mod http;
mod url;

pub use client::{
    BodyDescriptor, BodySource, ClientExecutor, ClientResponse, ExecutorTransport, HeaderList,
    PolicyDecoratingClient, RequestInfo, headers_from_list, headers_to_list, to_client_response,
    to_pipeline_request, to_pipeline_response, to_request_info,
};
pub use url::build_url;
