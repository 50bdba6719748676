//! Shared test helpers.

mod fake_media;
mod fixtures;
mod http_server;

pub use fake_media::FakeMediaElement;
pub use fixtures::{
    isobmff_init_segment, isobmff_media_segment, ladder, single_period_manifest, truncate,
    uniform_index,
};
pub use http_server::TestHttpServer;
