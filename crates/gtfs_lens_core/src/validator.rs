use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error};

use crate::{Anomaly, AnomalyReport, AnomalySeverity, GtfsFeed};

pub const CODE_RUNTIME_EXCEPTION: &str = "runtime_exception_in_validator_error";

pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, feed: &GtfsFeed, report: &mut AnomalyReport);
}

/// Runs validators one after another in registration order. A validator that
/// panics is reported as an anomaly and the rest still run.
#[derive(Default)]
pub struct ValidatorRunner {
    validators: Vec<Box<dyn Validator>>,
}

impl ValidatorRunner {
    pub fn new() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn register<V>(&mut self, validator: V)
    where
        V: Validator + 'static,
    {
        self.validators.push(Box::new(validator));
    }

    pub fn run(&self, feed: &GtfsFeed) -> AnomalyReport {
        let mut report = AnomalyReport::new();
        self.run_with(feed, &mut report);
        report
    }

    pub fn run_with(&self, feed: &GtfsFeed, report: &mut AnomalyReport) {
        for validator in &self.validators {
            let mut local = AnomalyReport::new();
            let result = catch_unwind(AssertUnwindSafe(|| {
                validator.validate(feed, &mut local)
            }));
            if let Err(panic) = result {
                let message = panic_payload_message(&*panic);
                error!("validator {} panicked: {}", validator.name(), message);
                local.push(runtime_exception_anomaly(validator.name(), message));
            }
            debug!("{}: {} anomaly(ies)", validator.name(), local.len());
            report.merge(local);
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|validator| validator.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

fn runtime_exception_anomaly(validator: &str, message: String) -> Anomaly {
    let mut anomaly = Anomaly::new(
        CODE_RUNTIME_EXCEPTION,
        AnomalySeverity::Error,
        "feed",
        format!("validator {} stopped unexpectedly", validator),
    );
    anomaly.insert_context_field("exception", "panic");
    anomaly.insert_context_field("message", message);
    anomaly.insert_context_field("validator", validator);
    anomaly
}

fn panic_payload_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
