/// Paths the audit stage never touches.
///
/// `exact` entries must equal the request path; `fragments` match anywhere in it.
#[derive(Debug, Clone, Default)]
pub struct AuditExemption {
    exact: Vec<String>,
    fragments: Vec<String>,
}

impl AuditExemption {
    pub fn new(exact: Vec<String>, fragments: Vec<String>) -> Self {
        Self { exact, fragments }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self.fragments.iter().any(|f| path.contains(f.as_str()))
    }
}
