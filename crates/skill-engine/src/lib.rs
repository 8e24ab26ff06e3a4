pub mod conflict;
pub mod copy;
pub mod git;
pub mod installed;
pub mod installer;
pub mod scanner;
pub mod service;
pub mod workdir;

pub use git::{GitConfig, GitRunner};
pub use installer::{Installer, InstallerConfig};
pub use scanner::{RepositoryScanner, ScannerConfig};
pub use service::SkillService;
