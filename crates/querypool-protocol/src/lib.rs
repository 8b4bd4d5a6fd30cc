//! Wire types and framing shared by the query pool orchestrator and its
//! worker processes.
//!
//! The orchestrator writes one [`WorkerBootstrap`] frame to a freshly spawned
//! worker, followed by any number of [`QueryRequest`] frames. The worker
//! answers each request with zero or more row frames and exactly one EOF
//! frame, all carried as [`ResponseFrame`] values.
//!
//! Every frame travels through the [`codec`] module: a big-endian length
//! prefix, a protocol version, and a compact JSON body. Length prefixing keeps
//! framing independent of whatever bytes the payload happens to contain.
//!
//! # Example
//!
//! ```
//! use querypool_protocol::{FrameDecoder, QueryRequest, Value, encode_frame};
//!
//! let request = QueryRequest::new("user_by_id", "users")
//!     .with_parameters(vec![Value::from(42_i64)]);
//! let bytes = encode_frame(&request).expect("request encodes");
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.extend(&bytes);
//! let decoded: QueryRequest = decoder
//!     .next_frame()
//!     .expect("a full frame is buffered")
//!     .expect("frame decodes");
//! assert_eq!(decoded, request);
//! ```

pub mod bootstrap;
pub mod codec;
pub mod error;
pub mod request;
pub mod response;
pub mod value;

pub use self::bootstrap::{ConnectionDescriptor, QueryCatalog, WorkerBootstrap};
pub use self::codec::{
    FrameDecoder, MAX_FRAME_LEN, PROTOCOL_VERSION, encode_frame, read_frame, write_frame,
};
pub use self::error::CodecError;
pub use self::request::{CorrelationId, QueryRequest, TERMINATE_QUERY};
pub use self::response::{Payload, ResponseFrame};
pub use self::value::{Row, RowShape, Value};
