//! Prompt templates rendered with minijinja
//!
//! Placeholders use Jinja syntax, `{{ name }}`. Filters, conditionals and
//! loops work as usual; every variable the template reads is an input
//! variable and must be supplied when formatting.

use docrefine_common::{DocRefineError, Result};
use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Named values supplied when formatting a template
pub type Inputs = BTreeMap<String, String>;

const TEMPLATE_NAME: &str = "prompt";

/// A prompt template compiled once at construction
#[derive(Clone)]
pub struct PromptTemplate {
    env: Environment<'static>,
    source: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    /// Compile a template, collecting its input variables
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let source = template.into();

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template_owned(TEMPLATE_NAME, source.clone())
            .map_err(|e| DocRefineError::template(format!("Invalid prompt template: {}", e)))?;

        let input_variables = {
            let compiled = env
                .get_template(TEMPLATE_NAME)
                .map_err(|e| DocRefineError::template(format!("Invalid prompt template: {}", e)))?;
            compiled
                .undeclared_variables(false)
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };

        Ok(Self {
            env,
            source,
            input_variables,
        })
    }

    /// Template made of a single placeholder, e.g. `{{ page_content }}`
    pub(crate) fn single_variable(name: &str) -> Self {
        match Self::new(format!("{{{{ {} }}}}", name)) {
            Ok(prompt) => prompt,
            Err(e) => unreachable!("placeholder for '{}' does not compile: {}", name, e),
        }
    }

    /// Variables the template reads, sorted by name
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Whether `name` is one of the template's input variables
    pub fn accepts(&self, name: &str) -> bool {
        self.input_variables.iter().any(|v| v == name)
    }

    /// Raw template text
    pub fn template(&self) -> &str {
        &self.source
    }

    /// Render the template. Every input variable must be present in `values`;
    /// values the template does not use are ignored.
    pub fn format(&self, values: &Inputs) -> Result<String> {
        let missing: Vec<&str> = self
            .input_variables
            .iter()
            .filter(|name| !values.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(DocRefineError::template(format!(
                "Missing input variables {:?} (template expects {:?})",
                missing, self.input_variables
            )));
        }

        self.env
            .get_template(TEMPLATE_NAME)
            .and_then(|tmpl| tmpl.render(values))
            .map_err(|e| DocRefineError::template(format!("Failed to render prompt: {}", e)))
    }
}

impl PartialEq for PromptTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for PromptTemplate {}

impl fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("template", &self.source)
            .field("input_variables", &self.input_variables)
            .finish()
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for PromptTemplate {
    type Err = DocRefineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
