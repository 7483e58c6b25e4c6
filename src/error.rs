use std::io;

use thiserror::Error;

use crate::frame_type::FrameType;
use crate::record::EventKind;

/// Errors that abort building a frame tree.
///
/// Every variant except [`Error::Io`] describes input the aggregator cannot make sense of. The
/// build is pure and in-memory, so none of them are worth retrying.
#[derive(Error, Debug)]
pub enum Error {
    /// A raw frame carried a frame-type code this crate cannot classify.
    #[error("unknown frame type in recording: {class_name}#{method_name}")]
    UnknownFrameType {
        /// Class of the offending frame.
        class_name: String,
        /// Method of the offending frame.
        method_name: String,
    },

    /// A synthetic frame type was asked to be named from a raw frame.
    #[error("frame type {0:?} cannot be named from a raw stack frame")]
    UnnameableFrameType(FrameType),

    /// The record has no stack trace, or an empty one.
    #[error("record has no stack trace")]
    MissingStack,

    /// An allocation or blocking record did not name the allocated or blocked-on class.
    #[error("{0:?} record has no weight entity")]
    MissingWeightEntity(EventKind),

    /// Adding a record would overflow the tree's sample or weight counters.
    #[error("sample or weight counters overflow")]
    CounterOverflow,

    /// Reading records failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A line of JSON-encoded records could not be decoded.
    #[error("invalid record on line {line}: {source}")]
    Json {
        /// 1-based line number of the record.
        line: usize,
        /// Underlying decoding error.
        source: serde_json::Error,
    },
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
