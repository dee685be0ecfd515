//! HTTP request handlers.

pub mod health;
pub mod serve;
pub mod upload;

pub use health::*;
pub use serve::*;
pub use upload::*;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped in a single URL path segment.
pub(crate) const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');
