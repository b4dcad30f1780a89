//! Harvester engine: fetching, discovery, extraction strategies and the
//! concurrent harvest loop.
mod api;
mod browser;
mod categories;
mod context;
mod decode;
mod discovery;
mod embedded;
mod engine;
mod fetch;
mod filename;
mod grid;
mod persist;
pub mod repair;
mod request;
mod retry;
mod sink;
mod strategy;
mod types;

pub use api::{ApiPaginatedStrategy, ApiProfile};
#[cfg(feature = "browser")]
pub use browser::{ChromiumConfig, ChromiumLauncher};
pub use browser::{
    initial_records, BrowserError, BrowserLauncher, BrowserProfile, BrowserSession, BrowserStrategy, LoadMore,
};
pub use categories::{CategoryDepth, CategoryNode, CategoryRow, CategoryTree, CategoryTreeError};
pub use context::HarvestContext;
pub use decode::{decode_body, DecodeError, DecodedText};
pub use discovery::{max_page_number, CategoryDiscovery, DiscoveryError, PaginationDiscovery, WorkDiscovery};
pub use embedded::{EmbeddedJsonProfile, EmbeddedJsonStrategy, ProfileError};
pub use engine::{ChannelProgressSink, EngineSettings, HarvestEngine, LogProgressSink, ProgressSink};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use filename::artifact_filename;
pub use grid::{correlate, extract_rows, GridProfile, GridRow, SelectorError};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use request::{PageRequest, RequestProfile};
pub use retry::RetryPolicy;
pub use sink::{finalize, ArtifactLayout, PersistedArtifact, SinkError, SinkOptions, UnitArtifactWriter};
pub use strategy::{ExtractionStrategy, BODY_EXCERPT_CHARS};
pub use types::{EngineEvent, FetchError, FetchFailure, FetchMetadata, FetchOutput};
