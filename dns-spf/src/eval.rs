//! The mechanism/modifier evaluator proper: walks a record's terms in
//! order, chasing `include`/`redirect` recursively, all against a
//! shared DNS-lookup budget (RFC 7208 section 4.6.4: more than 10
//! mechanisms/modifiers that require a lookup is a `PermError`; this
//! evaluator generalises that to the 20-lookup ceiling spec'd here).

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;

use dns_proto::name::DomainName;

use crate::macros::{self, MacroContext};
use crate::record::{self, Mechanism, Qualifier, Term};
use crate::resolver::Resolver;

pub const DEFAULT_LOOKUP_BUDGET: u32 = 20;
const MAX_MX_HOSTS_CHECKED: usize = 10;
const MAX_PTR_NAMES_CHECKED: usize = 10;

/// The full SPF/Sender-ID result space (RFC 7208 section 2.6): the
/// four mechanism qualifiers plus the three terminal non-qualifier
/// outcomes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SpfResult {
    Pass,
    Fail,
    SoftFail,
    Neutral,
    None,
    TempError,
    PermError,
}

impl From<Qualifier> for SpfResult {
    fn from(qualifier: Qualifier) -> Self {
        match qualifier {
            Qualifier::Pass => SpfResult::Pass,
            Qualifier::Fail => SpfResult::Fail,
            Qualifier::SoftFail => SpfResult::SoftFail,
            Qualifier::Neutral => SpfResult::Neutral,
        }
    }
}

/// The identity information an evaluation needs: the connecting IP
/// and the sender identity to check it against.
#[derive(Debug, Clone)]
pub struct Request {
    pub ip: IpAddr,
    pub sender_domain: String,
    pub sender_local_part: String,
    pub helo_name: String,
}

struct Budget {
    used: u32,
    max: u32,
}

impl Budget {
    fn new(max: u32) -> Self {
        Budget { used: 0, max }
    }

    /// Accounts for one more DNS lookup, returning `false` once the
    /// budget is exhausted.
    fn consume(&mut self) -> bool {
        if self.used >= self.max {
            return false;
        }
        self.used += 1;
        true
    }
}

/// Evaluates `request` against `resolver`, starting from the sender
/// domain's SPF record.
pub async fn evaluate(resolver: &dyn Resolver, request: &Request) -> SpfResult {
    let mut budget = Budget::new(DEFAULT_LOOKUP_BUDGET);
    evaluate_domain(resolver, request.sender_domain.clone(), request, &mut budget).await
}

fn evaluate_domain<'a>(
    resolver: &'a dyn Resolver,
    domain: String,
    request: &'a Request,
    budget: &'a mut Budget,
) -> Pin<Box<dyn Future<Output = SpfResult> + Send + 'a>> {
    Box::pin(async move {
        let terms = match acquire_record(resolver, &domain, budget).await {
            Ok(Some(terms)) => terms,
            Ok(None) => return SpfResult::None,
            Err(result) => return result,
        };
        let ctx = macro_context(&domain, request);

        let mut redirect_target = None;
        for term in &terms {
            match term {
                Term::Mechanism {
                    qualifier,
                    mechanism: Mechanism::Include { domain: spec },
                } => {
                    let expanded = match expand_domain_spec(spec, &ctx) {
                        Ok(d) => d,
                        Err(result) => return result,
                    };
                    match evaluate_domain(resolver, expanded, request, budget).await {
                        SpfResult::Pass => return SpfResult::from(*qualifier),
                        SpfResult::TempError => return SpfResult::TempError,
                        SpfResult::PermError | SpfResult::None => return SpfResult::PermError,
                        SpfResult::Fail | SpfResult::SoftFail | SpfResult::Neutral => {}
                    }
                }
                Term::Mechanism { qualifier, mechanism } => {
                    match matches_mechanism(resolver, mechanism, request, &ctx, budget).await {
                        Ok(true) => return SpfResult::from(*qualifier),
                        Ok(false) => {}
                        Err(result) => return result,
                    }
                }
                Term::Redirect(spec) => redirect_target = Some(spec.clone()),
                Term::Exp(_) | Term::Unknown => {}
            }
        }

        match redirect_target {
            Some(spec) => {
                let expanded = match expand_domain_spec(&spec, &ctx) {
                    Ok(d) => d,
                    Err(result) => return result,
                };
                evaluate_domain(resolver, expanded, request, budget).await
            }
            // RFC 7208 section 4.7: a record that is exhausted without
            // a match and without a redirect evaluates to Neutral.
            None => SpfResult::Neutral,
        }
    })
}

async fn acquire_record(
    resolver: &dyn Resolver,
    domain: &str,
    budget: &mut Budget,
) -> Result<Option<Vec<Term>>, SpfResult> {
    if !budget.consume() {
        return Err(SpfResult::PermError);
    }
    let txt_records = resolver.lookup_txt(domain).await.map_err(|_| SpfResult::TempError)?;
    let candidates: Vec<&String> = txt_records
        .iter()
        .filter(|record| record.starts_with("v=spf1 ") || *record == "v=spf1")
        .collect();
    match candidates.len() {
        0 => Ok(None),
        1 => record::parse(candidates[0]).map(Some).map_err(|_| SpfResult::PermError),
        _ => Err(SpfResult::PermError),
    }
}

async fn matches_mechanism(
    resolver: &dyn Resolver,
    mechanism: &Mechanism,
    request: &Request,
    ctx: &MacroContext,
    budget: &mut Budget,
) -> Result<bool, SpfResult> {
    match mechanism {
        Mechanism::All => Ok(true),
        Mechanism::Ip4 { network } => Ok(matches!(request.ip, IpAddr::V4(v4) if network.contains(&v4))),
        Mechanism::Ip6 { network } => Ok(matches!(request.ip, IpAddr::V6(v6) if network.contains(&v6))),
        Mechanism::A { domain, v4_prefix, v6_prefix } => {
            let target = resolve_domain_spec(domain, ctx)?;
            if !budget.consume() {
                return Err(SpfResult::PermError);
            }
            match_a_or_aaaa(resolver, &target, request.ip, *v4_prefix, *v6_prefix).await
        }
        Mechanism::Mx { domain, v4_prefix, v6_prefix } => {
            let target = resolve_domain_spec(domain, ctx)?;
            if !budget.consume() {
                return Err(SpfResult::PermError);
            }
            let hosts = resolver.lookup_mx(&target).await.map_err(|_| SpfResult::TempError)?;
            for host in hosts.iter().take(MAX_MX_HOSTS_CHECKED) {
                if !budget.consume() {
                    return Err(SpfResult::PermError);
                }
                if match_a_or_aaaa(resolver, host, request.ip, *v4_prefix, *v6_prefix).await? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Mechanism::Ptr { domain } => {
            let target = resolve_domain_spec(domain, ctx)?;
            if !budget.consume() {
                return Err(SpfResult::PermError);
            }
            let names = resolver.lookup_ptr(request.ip).await.map_err(|_| SpfResult::TempError)?;
            for name in names.iter().take(MAX_PTR_NAMES_CHECKED) {
                if !budget.consume() {
                    return Err(SpfResult::PermError);
                }
                if forward_confirms(resolver, name, request.ip).await? && is_subdomain_or_equal(name, &target) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Mechanism::Exists { domain } => {
            let target = expand_domain_spec(domain, ctx)?;
            if !budget.consume() {
                return Err(SpfResult::PermError);
            }
            Ok(!resolver.lookup_a(&target).await.map_err(|_| SpfResult::TempError)?.is_empty())
        }
        Mechanism::Include { .. } => unreachable!("include is handled by the caller, not matched as a boolean"),
    }
}

async fn forward_confirms(resolver: &dyn Resolver, name: &str, ip: IpAddr) -> Result<bool, SpfResult> {
    Ok(match ip {
        IpAddr::V4(v4) => resolver
            .lookup_a(name)
            .await
            .map_err(|_| SpfResult::TempError)?
            .into_iter()
            .any(|addr| addr == v4),
        IpAddr::V6(v6) => resolver
            .lookup_aaaa(name)
            .await
            .map_err(|_| SpfResult::TempError)?
            .into_iter()
            .any(|addr| addr == v6),
    })
}

async fn match_a_or_aaaa(
    resolver: &dyn Resolver,
    domain: &str,
    ip: IpAddr,
    v4_prefix: Option<u8>,
    v6_prefix: Option<u8>,
) -> Result<bool, SpfResult> {
    match ip {
        IpAddr::V4(target) => {
            let prefix = v4_prefix.unwrap_or(32);
            let addrs = resolver.lookup_a(domain).await.map_err(|_| SpfResult::TempError)?;
            Ok(addrs.iter().any(|&candidate| ipv4_in_prefix(candidate, target, prefix)))
        }
        IpAddr::V6(target) => {
            let prefix = v6_prefix.unwrap_or(128);
            let addrs = resolver.lookup_aaaa(domain).await.map_err(|_| SpfResult::TempError)?;
            Ok(addrs.iter().any(|&candidate| ipv6_in_prefix(candidate, target, prefix)))
        }
    }
}

fn ipv4_in_prefix(candidate: Ipv4Addr, target: Ipv4Addr, prefix: u8) -> bool {
    ipnet::Ipv4Net::new(candidate, prefix).map(|net| net.contains(&target)).unwrap_or(false)
}

fn ipv6_in_prefix(candidate: Ipv6Addr, target: Ipv6Addr, prefix: u8) -> bool {
    ipnet::Ipv6Net::new(candidate, prefix).map(|net| net.contains(&target)).unwrap_or(false)
}

fn is_subdomain_or_equal(name: &str, target: &str) -> bool {
    match (DomainName::from_dotted_string(name), DomainName::from_dotted_string(target)) {
        (Ok(name), Ok(target)) => name == target || name.is_subdomain_of(&target),
        _ => false,
    }
}

fn resolve_domain_spec(domain: &Option<String>, ctx: &MacroContext) -> Result<String, SpfResult> {
    match domain {
        Some(spec) => expand_domain_spec(spec, ctx),
        None => Ok(ctx.current_domain.clone()),
    }
}

fn expand_domain_spec(spec: &str, ctx: &MacroContext) -> Result<String, SpfResult> {
    macros::expand(spec, ctx).map_err(|_| SpfResult::PermError)
}

fn macro_context(current_domain: &str, request: &Request) -> MacroContext {
    MacroContext {
        sender: format!("{}@{}", request.sender_local_part, request.sender_domain),
        local_part: request.sender_local_part.clone(),
        sender_domain: request.sender_domain.clone(),
        current_domain: current_domain.to_string(),
        ip: request.ip,
        validated_domain: None,
        helo_domain: request.helo_name.clone(),
        receiving_domain: "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeResolver {
        txt: HashMap<String, Vec<String>>,
        a: HashMap<String, Vec<Ipv4Addr>>,
        lookups: Mutex<u32>,
    }

    #[async_trait]
    impl Resolver for FakeResolver {
        async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, crate::resolver::LookupError> {
            *self.lookups.lock().unwrap() += 1;
            Ok(self.txt.get(domain).cloned().unwrap_or_default())
        }
        async fn lookup_a(&self, domain: &str) -> Result<Vec<Ipv4Addr>, crate::resolver::LookupError> {
            *self.lookups.lock().unwrap() += 1;
            Ok(self.a.get(domain).cloned().unwrap_or_default())
        }
        async fn lookup_aaaa(&self, _domain: &str) -> Result<Vec<Ipv6Addr>, crate::resolver::LookupError> {
            Ok(Vec::new())
        }
        async fn lookup_mx(&self, _domain: &str) -> Result<Vec<String>, crate::resolver::LookupError> {
            Ok(Vec::new())
        }
        async fn lookup_ptr(&self, _ip: IpAddr) -> Result<Vec<String>, crate::resolver::LookupError> {
            Ok(Vec::new())
        }
    }

    fn request(ip: &str, domain: &str) -> Request {
        Request {
            ip: ip.parse().unwrap(),
            sender_domain: domain.to_string(),
            sender_local_part: "user".to_string(),
            helo_name: "mail.example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn ip4_mechanism_passes() {
        let mut resolver = FakeResolver::default();
        resolver.txt.insert("a.example".to_string(), vec!["v=spf1 ip4:192.0.2.0/24 -all".to_string()]);
        let result = evaluate(&resolver, &request("192.0.2.5", "a.example")).await;
        assert_eq!(SpfResult::Pass, result);
    }

    #[tokio::test]
    async fn include_chain_passes_through_nested_record() {
        let mut resolver = FakeResolver::default();
        resolver.txt.insert("a.example".to_string(), vec!["v=spf1 include:b.example -all".to_string()]);
        resolver.txt.insert("b.example".to_string(), vec!["v=spf1 ip4:192.0.2.0/24 -all".to_string()]);
        let result = evaluate(&resolver, &request("192.0.2.5", "a.example")).await;
        assert_eq!(SpfResult::Pass, result);
    }

    #[tokio::test]
    async fn deep_include_chain_exceeds_budget() {
        let mut resolver = FakeResolver::default();
        for i in 0..25 {
            resolver.txt.insert(format!("d{i}.example"), vec![format!("v=spf1 include:d{}.example -all", i + 1)]);
        }
        resolver.txt.insert("d25.example".to_string(), vec!["v=spf1 -all".to_string()]);
        let result = evaluate(&resolver, &request("192.0.2.5", "d0.example")).await;
        assert_eq!(SpfResult::PermError, result);
    }

    #[tokio::test]
    async fn no_record_is_none() {
        let resolver = FakeResolver::default();
        let result = evaluate(&resolver, &request("192.0.2.5", "nonexistent.example")).await;
        assert_eq!(SpfResult::None, result);
    }

    #[tokio::test]
    async fn multiple_records_is_permerror() {
        let mut resolver = FakeResolver::default();
        resolver.txt.insert(
            "a.example".to_string(),
            vec!["v=spf1 -all".to_string(), "v=spf1 +all".to_string()],
        );
        let result = evaluate(&resolver, &request("192.0.2.5", "a.example")).await;
        assert_eq!(SpfResult::PermError, result);
    }
}
