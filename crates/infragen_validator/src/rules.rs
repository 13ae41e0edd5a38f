//! Structural rules applied to parsed Terraform files.

use infragen_core::Diagnostic;

use crate::parser::Body;

/// Attribute-name fragments that suggest a secret.
pub const SENSITIVE_KEYWORDS: [&str; 6] = ["password", "secret", "key", "token", "access_key", "secret_key"];

/// A structural check over one file's top-level body.
pub trait Rule: Send + Sync {
    fn id(&self) -> &str;
    fn check(&self, file: &str, body: &Body) -> Vec<Diagnostic>;
}

/// Every `required_providers` entry should pin a version.
#[derive(Debug, Default)]
pub struct ProviderVersionRule;

impl Rule for ProviderVersionRule {
    fn id(&self) -> &str {
        "provider-version"
    }

    fn check(&self, file: &str, body: &Body) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for tf in body.blocks_of("terraform") {
            for rp in tf.body.blocks_of("required_providers") {
                for attr in &rp.body.attributes {
                    let (line, column) = (attr.pos.line, attr.pos.column);
                    match attr.expr.object_keys() {
                        Some(keys) if keys.contains(&"version") => {}
                        Some(_) => diags.push(Diagnostic::advisory(
                            file,
                            format!("Provider {} missing version constraint in {}", attr.name, file),
                            line,
                            column,
                        )),
                        None => diags.push(Diagnostic::advisory(
                            file,
                            format!("Provider {} has non-object requirement in {}", attr.name, file),
                            line,
                            column,
                        )),
                    }
                }
            }
        }
        diags
    }
}

/// Resources should carry a `lifecycle` block and a `tags` attribute.
#[derive(Debug, Default)]
pub struct ResourceHygieneRule;

impl Rule for ResourceHygieneRule {
    fn id(&self) -> &str {
        "resource-hygiene"
    }

    fn check(&self, file: &str, body: &Body) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for res in body.blocks_of("resource") {
            let (line, column) = (res.pos.line, res.pos.column);
            let [res_type, res_name] = match res.labels.as_slice() {
                [t, n] => [t, n],
                _ => {
                    diags.push(Diagnostic::error(
                        file,
                        format!(
                            "Resource block in {} needs exactly two labels (type and name), found {}",
                            file,
                            res.labels.len()
                        ),
                        line,
                        column,
                    ));
                    continue;
                }
            };

            if res.body.blocks_of("lifecycle").next().is_none() {
                diags.push(Diagnostic::advisory(
                    file,
                    format!("Resource {res_type}.{res_name} missing lifecycle block in {file}"),
                    line,
                    column,
                ));
            }
            if res.body.attribute("tags").is_none() {
                diags.push(Diagnostic::advisory(
                    file,
                    format!("Resource {res_type}.{res_name} missing tags attribute in {file}"),
                    line,
                    column,
                ));
            }
        }
        diags
    }
}

/// Resource attributes with secret-looking names must not hold literals.
#[derive(Debug)]
pub struct HardcodedSecretRule {
    keywords: Vec<String>,
}

impl Default for HardcodedSecretRule {
    fn default() -> Self {
        Self::new(SENSITIVE_KEYWORDS)
    }
}

impl HardcodedSecretRule {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords.into_iter().map(|k| k.as_ref().to_lowercase()).collect(),
        }
    }

    fn is_sensitive(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }
}

impl Rule for HardcodedSecretRule {
    fn id(&self) -> &str {
        "hardcoded-secret"
    }

    fn check(&self, file: &str, body: &Body) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for res in body.blocks_of("resource") {
            let label = res.labels.join(".");
            for attr in &res.body.attributes {
                if self.is_sensitive(&attr.name) && attr.expr.is_constant() {
                    diags.push(Diagnostic::advisory(
                        file,
                        format!(
                            "Possible hardcoded secret in attribute {} of resource {} in {}",
                            attr.name, label, file
                        ),
                        attr.pos.line,
                        attr.pos.column,
                    ));
                }
            }
        }
        diags
    }
}

/// An ordered set of rules.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleSet {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Provider versions, resource hygiene and hardcoded secrets.
    pub fn standard() -> Self {
        Self::empty()
            .with(ProviderVersionRule)
            .with(ResourceHygieneRule)
            .with(HardcodedSecretRule::default())
    }

    pub fn with(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    /// Run every rule, in order.
    pub fn evaluate(&self, file: &str, body: &Body) -> Vec<Diagnostic> {
        self.rules.iter().flat_map(|r| r.check(file, body)).collect()
    }
}
