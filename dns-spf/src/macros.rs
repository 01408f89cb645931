//! SPF macro expansion (RFC 7208 section 7, as scoped to the letters
//! this evaluator supports): `%{L<digits>r?delim*}`, plus the literal
//! escapes `%%`, `%_`, `%-`.

use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct MacroContext {
    /// `s`: the full sender address, `local-part@domain`.
    pub sender: String,
    /// `l`: the sender's local part.
    pub local_part: String,
    /// `o`: the sender's domain.
    pub sender_domain: String,
    /// `d`: the domain currently being evaluated (changes across
    /// `include`/`redirect`).
    pub current_domain: String,
    /// `i`: the client IP, and `c`, which is the same value under a
    /// different letter per this evaluator's reading of the "c macro
    /// canonical form" question — both use the standard library's
    /// `Display` impl for the address.
    pub ip: IpAddr,
    /// `p`: the validated domain name from a PTR lookup of `ip`, if
    /// one was performed and matched; `"unknown"` otherwise.
    pub validated_domain: Option<String>,
    /// `h`: the HELO/EHLO domain given by the client.
    pub helo_domain: String,
    /// `r`: the domain of the host performing the evaluation.
    pub receiving_domain: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("malformed SPF macro")]
pub struct MacroError;

impl MacroContext {
    fn letter_value(&self, letter: char) -> Result<String, MacroError> {
        Ok(match letter {
            's' => self.sender.clone(),
            'l' => self.local_part.clone(),
            'o' => self.sender_domain.clone(),
            'd' => self.current_domain.clone(),
            'i' => self.ip.to_string(),
            'c' => self.ip.to_string(),
            'p' => self.validated_domain.clone().unwrap_or_else(|| "unknown".to_string()),
            'h' => {
                if self.helo_domain.is_empty() {
                    "unknown".to_string()
                } else {
                    self.helo_domain.clone()
                }
            }
            'r' => self.receiving_domain.clone(),
            'v' => match self.ip {
                IpAddr::V4(_) => "in-addr".to_string(),
                IpAddr::V6(_) => "ip6".to_string(),
            },
            't' => return Err(MacroError), // no timestamp source in this evaluator
            _ => return Err(MacroError),
        })
    }
}

/// Expands every `%{...}` macro and literal escape in `template`.
pub fn expand(template: &str, ctx: &MacroContext) -> Result<String, MacroError> {
    let mut out = String::new();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next().ok_or(MacroError)? {
            '%' => out.push('%'),
            '_' => out.push(' '),
            '-' => out.push_str("%20"),
            '{' => {
                let mut spec = String::new();
                loop {
                    match chars.next().ok_or(MacroError)? {
                        '}' => break,
                        ch => spec.push(ch),
                    }
                }
                out.push_str(&expand_one(&spec, ctx)?);
            }
            _ => return Err(MacroError),
        }
    }
    Ok(out)
}

fn expand_one(spec: &str, ctx: &MacroContext) -> Result<String, MacroError> {
    let mut chars = spec.chars();
    let letter = chars.next().ok_or(MacroError)?.to_ascii_lowercase();
    let value = ctx.letter_value(letter)?;

    let rest: String = chars.collect();
    let mut rest_chars = rest.chars().peekable();

    let mut digit_str = String::new();
    while let Some(&d) = rest_chars.peek() {
        if d.is_ascii_digit() {
            digit_str.push(d);
            rest_chars.next();
        } else {
            break;
        }
    }

    let reversed = if rest_chars.peek() == Some(&'r') {
        rest_chars.next();
        true
    } else {
        false
    };

    let delimiters: Vec<char> = rest_chars.collect();
    let delimiter_set: &[char] = if delimiters.is_empty() { &['.'] } else { &delimiters };

    let mut parts: Vec<&str> = value.split(|c| delimiter_set.contains(&c)).collect();
    if reversed {
        parts.reverse();
    }
    if let Ok(n) = digit_str.parse::<usize>() {
        if n > 0 && n < parts.len() {
            parts = parts[parts.len() - n..].to_vec();
        }
    }
    Ok(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> MacroContext {
        MacroContext {
            sender: "strong-bad@email.example.com".to_string(),
            local_part: "strong-bad".to_string(),
            sender_domain: "email.example.com".to_string(),
            current_domain: "email.example.com".to_string(),
            ip: "192.0.2.3".parse().unwrap(),
            validated_domain: None,
            helo_domain: "mail.example.com".to_string(),
            receiving_domain: "receiver.example.net".to_string(),
        }
    }

    #[test]
    fn expands_sender_and_literal_escapes() {
        assert_eq!("strong-bad@email.example.com", expand("%{s}", &ctx()).unwrap());
        assert_eq!("strong-bad@email.example.com%", expand("%{s}%%", &ctx()).unwrap());
        assert_eq!("a b", expand("a%_b", &ctx()).unwrap());
    }

    #[test]
    fn keeps_last_n_components_after_optional_reverse() {
        assert_eq!("example.com", expand("%{d2}", &ctx()).unwrap());
        assert_eq!("com.example.email", expand("%{dr}", &ctx()).unwrap());
    }

    #[test]
    fn defaults_unresolvable_p_to_unknown() {
        assert_eq!("unknown", expand("%{p}", &ctx()).unwrap());
    }

    #[test]
    fn v_macro_reflects_address_family() {
        assert_eq!("in-addr", expand("%{v}", &ctx()).unwrap());
    }
}
