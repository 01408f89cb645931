//! Periodic SPF record health monitoring: re-evaluates a configured
//! domain list's SPF policy on a timer and records the result to
//! Prometheus, the same shape as a periodic cache-pruning or
//! zone-reload background task.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use dns_spf::{evaluate, Request, Resolver, SpfResult};

use crate::metrics;

fn outcome_label(result: SpfResult) -> &'static str {
    match result {
        SpfResult::Pass => "pass",
        SpfResult::Fail => "fail",
        SpfResult::SoftFail => "softfail",
        SpfResult::Neutral => "neutral",
        SpfResult::None => "none",
        SpfResult::TempError => "temperror",
        SpfResult::PermError => "permerror",
    }
}

/// Evaluates each domain in `domains` against its own declared SPF
/// policy (sender `postmaster@domain`, checking a null connecting IP)
/// on every tick: not a real mail-flow decision, a health signal for
/// "does this domain still publish a record that parses and
/// resolves."
pub async fn run(domains: Vec<String>, resolver: Arc<dyn Resolver>, interval: Duration) {
    if domains.is_empty() {
        return;
    }
    loop {
        for domain in &domains {
            let request = Request {
                ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                sender_domain: domain.clone(),
                sender_local_part: "postmaster".to_string(),
                helo_name: domain.clone(),
            };
            let result = evaluate(resolver.as_ref(), &request).await;
            tracing::info!(%domain, result = outcome_label(result), "spf record check");
            metrics::record_spf_result(outcome_label(result));
        }
        tokio::time::sleep(interval).await;
    }
}
