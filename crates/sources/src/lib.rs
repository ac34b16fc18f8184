//! Concrete sources behind the snapshot contracts of `folio-context`.

pub mod github;
pub mod records_sqlite;
pub mod resume;

pub use {
    github::GitHubRepositorySource, records_sqlite::SqliteRecordSource, resume::FileResumeSource,
};
