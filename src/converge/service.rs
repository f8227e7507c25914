// src/converge/service.rs

//! Service convergence and start verification
//!
//! A start command returning success only means the service manager
//! accepted the job. The service counts as converged once its status
//! reports it active with a live main process; until then it is polled at
//! a fixed interval, bounded by the verification timeout.

use super::{Action, ConvergeContext, ResourceError};
use crate::host::{Host, HostError};
use crate::resource::{Attributes, Observation, ServiceSpec};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

pub(super) fn apply_service<H: Host + ?Sized>(
    host: &mut H,
    spec: &ServiceSpec,
    observed: &Observation,
    action: Action,
    ctx: &ConvergeContext,
) -> Result<(), ResourceError> {
    let fail = |e: HostError| ResourceError::converge(action, e);

    let status = match observed.attributes() {
        Some(Attributes::Service(status)) => Some(status),
        _ => None,
    };

    if spec.enable && !status.is_some_and(|s| s.enabled) {
        host.enable_service(&spec.name).map_err(fail)?;
    }

    if !status.is_some_and(|s| s.is_running()) {
        host.start_service(&spec.name).map_err(fail)?;
    } else if ctx.refresh {
        info!("Restarting {} after a subscribed change", spec.name);
        host.restart_service(&spec.name).map_err(fail)?;
    } else {
        return Ok(());
    }

    verify_running(host, &spec.name, action, ctx)
}

/// Poll until `name` runs or the verification timeout elapses
fn verify_running<H: Host + ?Sized>(
    host: &H,
    name: &str,
    action: Action,
    ctx: &ConvergeContext,
) -> Result<(), ResourceError> {
    let started = Instant::now();
    loop {
        let status = host
            .service_status(name)
            .map_err(|e| ResourceError::converge(action, e))?;
        if status.is_running() {
            debug!("{} running after {:?}", name, started.elapsed());
            return Ok(());
        }

        let waited = started.elapsed();
        if waited >= ctx.service_timeout {
            return Err(ResourceError::VerificationTimeout {
                service: name.to_string(),
                waited,
            });
        }
        thread::sleep(ctx.poll_interval.min(ctx.service_timeout - waited));
    }
}
