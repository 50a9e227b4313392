//! `template.yml` metadata for generated templates.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::error::CliResult;
use crate::generate::AppType;

pub const ALBERT_BASE_URL: &str = "https://albert.api.etalab.gouv.fr/v1";
pub const DEFAULT_MODEL: &str = "openweight-large";
pub const CHAINLIT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const REFLEX_SYSTEM_PROMPT: &str =
    "You are a friendly chatbot named Reflex. Respond in markdown.";
pub const CHAINLIT_WELCOME: &str = "Welcome to Chainlit! 🚀🤖";

#[derive(Debug, Serialize)]
pub struct TemplateConfig {
    pub title: &'static str,
    pub description: &'static str,
    pub variables: Variables,
}

#[derive(Debug, Serialize)]
pub struct TemplateVariable {
    #[serde(rename = "type")]
    pub var_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
    pub prompt: &'static str,
}

/// Template variables, serialized as a mapping in declaration order
#[derive(Debug)]
pub struct Variables(pub Vec<(&'static str, TemplateVariable)>);

impl Serialize for Variables {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, variable) in &self.0 {
            map.serialize_entry(name, variable)?;
        }
        map.end()
    }
}

fn string_var(default: Option<&'static str>, prompt: &'static str) -> TemplateVariable {
    TemplateVariable {
        var_type: "string",
        default,
        prompt,
    }
}

impl TemplateConfig {
    pub fn for_app(app: AppType) -> Self {
        let (title, description, project_default, description_default, system_prompt) =
            match app {
                AppType::Chainlit => (
                    "Chainlit Chat",
                    "A Chainlit Chat Application with OpenAI Functions",
                    "my-chainlit-app",
                    "A Chainlit Chat Application",
                    CHAINLIT_SYSTEM_PROMPT,
                ),
                AppType::Reflex => (
                    "Reflex Chat",
                    "A Reflex Chat Application",
                    "my-reflex-app",
                    "A Reflex Chat Application",
                    REFLEX_SYSTEM_PROMPT,
                ),
            };

        let mut variables = vec![
            (
                "project_name",
                string_var(Some(project_default), "What is the name of your project?"),
            ),
            (
                "description",
                string_var(Some(description_default), "Short description of the project"),
            ),
            (
                "openai_api_key",
                string_var(
                    None,
                    "What is your Albert API Key? (Get one at https://albert.sites.beta.gouv.fr/access/)",
                ),
            ),
            (
                "openai_base_url",
                string_var(Some(ALBERT_BASE_URL), "What is your OpenAI Base URL?"),
            ),
            (
                "openai_model",
                string_var(Some(DEFAULT_MODEL), "Default OpenAI model to use"),
            ),
            (
                "system_prompt",
                string_var(Some(system_prompt), "Initial system prompt for the assistant"),
            ),
        ];

        if app == AppType::Chainlit {
            variables.push((
                "welcome_message",
                string_var(Some(CHAINLIT_WELCOME), "Header text for the welcome screen"),
            ));
        }

        Self {
            title,
            description,
            variables: Variables(variables),
        }
    }

    pub fn to_yaml(&self) -> CliResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
