//! Test harness for isolated convergence runs.
//!
//! Every `TestHarness` owns its own `FakeService`, so tests never share
//! remote state and can run in parallel.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use graph_converge::client::{FakeService, RecordedRequest};
use graph_converge::controller::{Controller, ReadBackPolicy, Timeouts};
use graph_converge::kinds::{
    app_configuration, assignment_filter, platform_script, AppConfigurationMapper,
    AssignmentFilterMapper, PlatformScriptMapper,
};
use reqwest::Method;

pub const SCRIPTS: &str = "/deviceManagement/deviceManagementScripts";
pub const FILTERS: &str = "/deviceManagement/assignmentFilters";
pub const APP_CONFIGS: &str = "/deviceAppManagement/mobileAppConfigurations";

pub type FakeController<M> = Controller<M, Arc<FakeService>>;

/// Read-back spacing short enough for real-time tests.
pub fn fast_read_back() -> ReadBackPolicy {
    ReadBackPolicy {
        attempts: 3,
        backoff: Duration::from_millis(10),
    }
}

pub struct TestHarness {
    pub fake: Arc<FakeService>,
    timeouts: Timeouts,
    read_back: ReadBackPolicy,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            fake: Arc::new(FakeService::new()),
            timeouts: Timeouts::default(),
            read_back: fast_read_back(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_read_back(mut self, read_back: ReadBackPolicy) -> Self {
        self.read_back = read_back;
        self
    }

    fn controller<M: graph_converge::kinds::ObjectMapper>(&self, mapper: M) -> FakeController<M> {
        Controller::new(mapper, Arc::clone(&self.fake))
            .with_timeouts(self.timeouts)
            .with_read_back(self.read_back)
    }

    pub fn scripts(&self) -> FakeController<PlatformScriptMapper> {
        self.controller(PlatformScriptMapper::new())
    }

    pub fn filters(&self) -> FakeController<AssignmentFilterMapper> {
        self.controller(AssignmentFilterMapper::new())
    }

    pub fn app_configs(&self) -> FakeController<AppConfigurationMapper> {
        self.controller(AppConfigurationMapper::new())
    }

    pub fn script_path(id: &str) -> String {
        platform_script::descriptor().object_path(id)
    }

    pub fn filter_path(id: &str) -> String {
        assignment_filter::descriptor().object_path(id)
    }

    pub fn app_config_path(id: &str) -> String {
        app_configuration::descriptor().object_path(id)
    }

    /// Requests with `method` whose path contains `fragment`, in order.
    pub async fn requests_matching(&self, method: Method, fragment: &str) -> Vec<RecordedRequest> {
        self.fake
            .requests()
            .await
            .into_iter()
            .filter(|r| r.method == method && r.path.contains(fragment))
            .collect()
    }

    /// Number of requests that changed remote state.
    pub async fn write_count(&self) -> usize {
        self.fake
            .requests()
            .await
            .iter()
            .filter(|r| r.method != Method::GET)
            .count()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
