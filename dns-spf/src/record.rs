//! Parsing an SPF record's text into an ordered term list (RFC 7208
//! section 4.6/6): mechanisms, `redirect=`, `exp=`, and anything else
//! (ignored, per the "unrecognized modifiers must be ignored" rule).

use ipnet::{Ipv4Net, Ipv6Net};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Qualifier {
    Pass,
    Fail,
    SoftFail,
    Neutral,
}

impl Qualifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Qualifier::Pass),
            '-' => Some(Qualifier::Fail),
            '~' => Some(Qualifier::SoftFail),
            '?' => Some(Qualifier::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Mechanism {
    All,
    A {
        domain: Option<String>,
        v4_prefix: Option<u8>,
        v6_prefix: Option<u8>,
    },
    Mx {
        domain: Option<String>,
        v4_prefix: Option<u8>,
        v6_prefix: Option<u8>,
    },
    Ip4 {
        network: Ipv4Net,
    },
    Ip6 {
        network: Ipv6Net,
    },
    Ptr {
        domain: Option<String>,
    },
    Exists {
        domain: String,
    },
    Include {
        domain: String,
    },
}

#[derive(Debug, Clone)]
pub enum Term {
    Mechanism { qualifier: Qualifier, mechanism: Mechanism },
    Redirect(String),
    Exp(String),
    /// An unrecognised mechanism or modifier: RFC 7208 requires these
    /// be ignored rather than rejected, unlike a malformed known term.
    Unknown,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("malformed SPF record")]
pub struct ParseError;

/// Parses the terms of an SPF record whose `v=spf1` prefix has
/// already been matched by the caller.
pub fn parse(record: &str) -> Result<Vec<Term>, ParseError> {
    let rest = record.strip_prefix("v=spf1").ok_or(ParseError)?;
    let mut terms = Vec::new();
    let mut redirect_seen = false;
    let mut exp_seen = false;

    for token in rest.split_whitespace() {
        let term = parse_term(token)?;
        match &term {
            Term::Redirect(_) if redirect_seen => return Err(ParseError),
            Term::Redirect(_) => redirect_seen = true,
            Term::Exp(_) if exp_seen => return Err(ParseError),
            Term::Exp(_) => exp_seen = true,
            _ => {}
        }
        terms.push(term);
    }
    Ok(terms)
}

fn parse_term(token: &str) -> Result<Term, ParseError> {
    if let Some(domain) = token.strip_prefix("redirect=") {
        return Ok(Term::Redirect(domain.to_string()));
    }
    if let Some(template) = token.strip_prefix("exp=") {
        return Ok(Term::Exp(template.to_string()));
    }

    let mut rest = token;
    let qualifier = match rest.chars().next().and_then(Qualifier::from_char) {
        Some(q) => {
            rest = &rest[1..];
            q
        }
        None => Qualifier::Pass,
    };

    let split_at = rest.find([':', '/']).unwrap_or(rest.len());
    let (name, body) = rest.split_at(split_at);

    let mechanism = match name {
        "all" => Mechanism::All,
        "a" => parse_a_or_mx(body, false)?,
        "mx" => parse_a_or_mx(body, true)?,
        "ip4" => Mechanism::Ip4 { network: parse_ip4_network(body)? },
        "ip6" => Mechanism::Ip6 { network: parse_ip6_network(body)? },
        "ptr" => Mechanism::Ptr { domain: body.strip_prefix(':').map(str::to_string) },
        "exists" => Mechanism::Exists { domain: require_domain(body)? },
        "include" => Mechanism::Include { domain: require_domain(body)? },
        _ => return Ok(Term::Unknown),
    };
    Ok(Term::Mechanism { qualifier, mechanism })
}

fn require_domain(body: &str) -> Result<String, ParseError> {
    body.strip_prefix(':').map(str::to_string).filter(|s| !s.is_empty()).ok_or(ParseError)
}

fn parse_a_or_mx(body: &str, is_mx: bool) -> Result<Mechanism, ParseError> {
    let mut remaining = body;
    let domain = if let Some(after_colon) = remaining.strip_prefix(':') {
        let end = after_colon.find('/').unwrap_or(after_colon.len());
        let (d, tail) = after_colon.split_at(end);
        remaining = tail;
        Some(d.to_string())
    } else {
        None
    };

    let mut v4_prefix = None;
    let mut v6_prefix = None;
    if let Some(after_slash) = remaining.strip_prefix('/') {
        if let Some(v6) = after_slash.strip_prefix('/') {
            v6_prefix = Some(v6.parse().map_err(|_| ParseError)?);
        } else {
            let end = after_slash.find("//").unwrap_or(after_slash.len());
            let (v4, tail) = after_slash.split_at(end);
            v4_prefix = Some(v4.parse().map_err(|_| ParseError)?);
            if let Some(v6) = tail.strip_prefix("//") {
                v6_prefix = Some(v6.parse().map_err(|_| ParseError)?);
            }
        }
    }

    Ok(if is_mx {
        Mechanism::Mx { domain, v4_prefix, v6_prefix }
    } else {
        Mechanism::A { domain, v4_prefix, v6_prefix }
    })
}

fn parse_ip4_network(body: &str) -> Result<Ipv4Net, ParseError> {
    let spec = body.strip_prefix(':').ok_or(ParseError)?;
    match spec.split_once('/') {
        Some((addr, prefix)) => format!("{addr}/{prefix}").parse().map_err(|_| ParseError),
        None => format!("{spec}/32").parse().map_err(|_| ParseError),
    }
}

fn parse_ip6_network(body: &str) -> Result<Ipv6Net, ParseError> {
    let spec = body.strip_prefix(':').ok_or(ParseError)?;
    match spec.split_once('/') {
        Some((addr, prefix)) => format!("{addr}/{prefix}").parse().map_err(|_| ParseError),
        None => format!("{spec}/128").parse().map_err(|_| ParseError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_record() {
        let terms = parse("v=spf1 a mx -all").unwrap();
        assert_eq!(3, terms.len());
        assert!(matches!(
            terms[0],
            Term::Mechanism { qualifier: Qualifier::Pass, mechanism: Mechanism::A { domain: None, .. } }
        ));
        assert!(matches!(
            terms[2],
            Term::Mechanism { qualifier: Qualifier::Fail, mechanism: Mechanism::All }
        ));
    }

    #[test]
    fn parses_ip4_with_prefix() {
        let terms = parse("v=spf1 ip4:192.0.2.0/24 -all").unwrap();
        let Term::Mechanism { mechanism: Mechanism::Ip4 { network }, .. } = &terms[0] else {
            panic!("expected an ip4 mechanism");
        };
        assert_eq!(24, network.prefix_len());
    }

    #[test]
    fn rejects_a_second_redirect() {
        assert!(parse("v=spf1 redirect=a.example redirect=b.example").is_err());
    }

    #[test]
    fn unknown_modifiers_are_ignored_not_rejected() {
        let terms = parse("v=spf1 unknown-modifier=x -all").unwrap();
        assert!(matches!(terms[0], Term::Unknown));
    }
}
