//! The static job catalog
//!
//! Built once at startup from the embedding application's job list and
//! never mutated afterwards. Validation happens once, here, rather than
//! being re-checked on every scheduler tick.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::runner::ChildLogger;
use super::schedule::ScheduleSpec;
use crate::error::{CatalogError, JobFailure};

/// Result type returned by a job's run-function.
pub type RunResult = std::result::Result<(), JobFailure>;

/// A job's run-function: takes the job's opaque config and a logger,
/// and either completes normally (`Ok(())`) or reports a failure.
pub type RunFn = Arc<dyn Fn(Value, &ChildLogger) -> RunResult + Send + Sync>;

/// An immutable catalog entry.
#[derive(Clone)]
pub struct Job {
    pub name: String,
    pub timeout_seconds: u64,
    pub retries: u32,
    pub dependencies: HashSet<String>,
    pub schedule: Vec<ScheduleSpec>,
    pub config: Value,
    pub run: RunFn,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retries", &self.retries)
            .field("dependencies", &self.dependencies)
            .field("schedule", &self.schedule)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Job {
    pub fn builder(name: impl Into<String>, run: RunFn) -> JobBuilder {
        JobBuilder::new(name, run)
    }
}

/// Ergonomic construction of a [`Job`], mirroring the way the rest of
/// the stack builds its immutable config structs.
pub struct JobBuilder {
    name: String,
    timeout_seconds: u64,
    retries: u32,
    dependencies: HashSet<String>,
    schedule: Vec<ScheduleSpec>,
    config: Value,
    run: RunFn,
}

impl JobBuilder {
    pub fn new(name: impl Into<String>, run: RunFn) -> Self {
        Self {
            name: name.into(),
            timeout_seconds: 60,
            retries: 0,
            dependencies: HashSet::new(),
            schedule: Vec::new(),
            config: Value::Null,
            run,
        }
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn depends_on(mut self, job_name: impl Into<String>) -> Self {
        self.dependencies.insert(job_name.into());
        self
    }

    pub fn schedule(mut self, spec: ScheduleSpec) -> Self {
        self.schedule.push(spec);
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Job {
        Job {
            name: self.name,
            timeout_seconds: self.timeout_seconds,
            retries: self.retries,
            dependencies: self.dependencies,
            schedule: self.schedule,
            config: self.config,
            run: self.run,
        }
    }
}

/// The validated, immutable set of jobs the orchestrator will schedule.
pub struct JobCatalog {
    jobs: HashMap<String, Job>,
    resources: HashMap<String, super::resource::Resource>,
}

impl JobCatalog {
    /// Validate uniqueness of names and resolvability of dependency
    /// references, then freeze the catalog. No shared resources are
    /// registered; see [`JobCatalog::build_with_resources`].
    pub fn build(jobs: Vec<Job>) -> std::result::Result<Self, CatalogError> {
        Self::build_with_resources(jobs, Vec::new())
    }

    /// Validate uniqueness of job names, uniqueness of resource keys,
    /// and resolvability of dependency references, then freeze the
    /// catalog alongside the registered resources.
    pub fn build_with_resources(
        jobs: Vec<Job>,
        resources: Vec<super::resource::Resource>,
    ) -> std::result::Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for job in &jobs {
            if !seen.insert(job.name.clone()) {
                duplicates.push(job.name.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(CatalogError::DuplicateJobNames(duplicates));
        }

        let duplicate_resource_keys = super::resource::duplicate_keys(&resources);
        if !duplicate_resource_keys.is_empty() {
            return Err(CatalogError::DuplicateResourceKey(duplicate_resource_keys));
        }

        let names: HashSet<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        for job in &jobs {
            for dep in &job.dependencies {
                if !names.contains(dep.as_str()) {
                    return Err(CatalogError::UnknownDependency {
                        job_name: job.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let jobs = jobs.into_iter().map(|j| (j.name.clone(), j)).collect();
        let resources = resources.into_iter().map(|r| (r.key.clone(), r)).collect();
        Ok(Self { jobs, resources })
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    pub fn resource(&self, key: &str) -> Option<&super::resource::Resource> {
        self.resources.get(key)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_run() -> RunFn {
        Arc::new(|_config, _logger| Ok(()))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let jobs = vec![
            Job::builder("sync", noop_run()).build(),
            Job::builder("sync", noop_run()).build(),
        ];
        let err = JobCatalog::build(jobs).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateJobNames(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let jobs = vec![Job::builder("report", noop_run()).depends_on("extract").build()];
        let err = JobCatalog::build(jobs).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownDependency { .. }));
    }

    #[test]
    fn duplicate_resource_keys_are_rejected() {
        let jobs = vec![Job::builder("extract", noop_run()).build()];
        let resources = vec![
            super::super::resource::Resource::new("db"),
            super::super::resource::Resource::new("db"),
        ];
        let err = JobCatalog::build_with_resources(jobs, resources).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateResourceKey(_)));
    }

    #[test]
    fn unique_resources_are_registered_and_queryable() {
        let jobs = vec![Job::builder("extract", noop_run()).build()];
        let resources = vec![super::super::resource::Resource::new("db")];
        let catalog = JobCatalog::build_with_resources(jobs, resources).unwrap();
        assert!(catalog.resource("db").is_some());
        assert!(catalog.resource("missing").is_none());
    }

    #[test]
    fn valid_catalog_is_accepted_and_queryable() {
        let jobs = vec![
            Job::builder("extract", noop_run()).build(),
            Job::builder("report", noop_run()).depends_on("extract").build(),
        ];
        let catalog = JobCatalog::build(jobs).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("report").is_some());
        assert!(catalog.get("missing").is_none());
    }
}
