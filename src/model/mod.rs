//! Core data types for dependencies, IOC records, and scan results.
//!
//! This module contains the fundamental types used throughout supplyscan:
//!
//! - [`Dependency`] - A package reference extracted from a lockfile
//! - [`LockfileFormat`] - The lockfile dialect it came from
//! - [`SourceRecord`] / [`CompromisedPackage`] / [`IocIndex`] - IOC data
//! - [`ScanResult`] / [`CheckResult`] / [`StatusResponse`] / [`RefreshResult`] -
//!   the documents returned by the tool surface

mod dependency;
mod ioc;
mod report;

pub use dependency::{Dependency, LockfileFormat, LockfileInfo, SUPPORTED_LOCKFILES};
pub use ioc::{CompromisedPackage, IndexMeta, IocIndex, SourcePackage, SourceRecord, SourceStatus};
pub use report::{
    CheckResult, CheckSupplyChain, Finding, IndexStatus, IssueCounts, RefreshResult, ScanResult,
    ScanSummary, SourceRefreshInfo, StatusResponse, SupplyChainReport, VulnerabilityFinding,
    VulnerabilityInfo, VulnerabilityReport, Warning,
};
