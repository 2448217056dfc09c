//! Upstream host intelligence
//!
//! Clients for the threat-intelligence host service and the web archive
//! snapshot index. Both sit behind traits so the host feature set can be
//! exercised without network access.

pub mod archive;
pub mod host_intel;

pub use archive::{parse_cdx, ArchiveError, ArchiveSource, CdxArchive, Snapshot};
pub use host_intel::{HostIntel, HostIntelClient, IntelCertificate, IntelError, IntelSource};
