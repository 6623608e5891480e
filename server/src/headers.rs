//! The accumulated set of headers for one mail, as seen at `SMFIC_EOH`.

use std::collections::HashMap;

/// Headers accumulated between `SMFIC_MAIL` and `SMFIC_EOH`, keyed by name.
///
/// Header names are not unique; each name maps to the ordered list of values
/// received for it, in the order the milter client sent them.
pub type HeaderMap = HashMap<String, Vec<String>>;
