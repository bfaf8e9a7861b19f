//! Repository traits and implementations.

pub mod app;
pub mod buildpack;
pub mod droplet;
pub mod package;

pub use app::{AppRepo, PgAppRepo};
pub use buildpack::{BuildpackRepo, PgBuildpackRepo};
pub use droplet::{DropletRepo, NewDroplet, PgDropletRepo};
pub use package::{PackageRepo, PgPackageRepo};
