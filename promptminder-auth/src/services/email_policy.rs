/// Registration email-domain allow-list.
#[derive(Debug, Clone)]
pub struct EmailDomainPolicy {
    domains: Vec<String>,
}

impl EmailDomainPolicy {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Exact match on the part after the last `@`. Malformed addresses are rejected.
    pub fn is_allowed(&self, email: &str) -> bool {
        let Some((local, domain)) = email.trim().rsplit_once('@') else {
            return false;
        };
        if local.is_empty() || domain.is_empty() {
            return false;
        }

        let domain = domain.to_lowercase();
        self.domains.iter().any(|d| *d == domain)
    }

    pub fn restriction_message(&self) -> String {
        match self.domains.as_slice() {
            [single] => format!("Only email addresses from the domain {} are allowed.", single),
            domains => format!(
                "Only email addresses from the following domains are allowed: {}.",
                domains.join(", ")
            ),
        }
    }
}

impl Default for EmailDomainPolicy {
    fn default() -> Self {
        Self::new(["dev.zo"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_domain() {
        let policy = EmailDomainPolicy::default();

        assert!(policy.is_allowed("a@dev.zo"));
        assert!(policy.is_allowed("A@DEV.ZO"));
        assert!(!policy.is_allowed("a@evil.com"));
        assert!(!policy.is_allowed("a@sub.dev.zo"));
        assert!(!policy.is_allowed("not-an-email"));
        assert!(!policy.is_allowed("@dev.zo"));
    }

    #[test]
    fn test_restriction_message() {
        assert_eq!(
            EmailDomainPolicy::default().restriction_message(),
            "Only email addresses from the domain dev.zo are allowed."
        );
        assert_eq!(
            EmailDomainPolicy::new(["dev.zo", "corp.com"]).restriction_message(),
            "Only email addresses from the following domains are allowed: dev.zo, corp.com."
        );
    }
}
