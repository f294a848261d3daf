//! Word checking: the values exchanged per word, the corrections dictionary
//! and the gateway that resolves words against it.

pub mod dictionary;
pub mod gateway;
pub mod types;

pub use dictionary::{
    candidate_paths, locate, CorrectionLookup, DictionaryError, DictionaryHandle,
    DictionarySnapshot, DictionaryWatcher, CORRECTIONS_FILENAME, SYSTEM_CORRECTIONS_PATH,
};
pub use gateway::{CorrectionGateway, LocalResolver, ResolveError, Resolver};
pub use types::{CorrectionResult, WordBoundary};
