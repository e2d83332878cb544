//! Prompt templates for each gateway call, rendered with minijinja.

use minijinja::Environment;
use serde::Serialize;

use factline_core::LlmError;

pub(crate) const DECOMPOSE: &str = "decompose";
pub(crate) const ORCHESTRATE: &str = "orchestrate";
pub(crate) const EXTRACT: &str = "extract";
pub(crate) const TRANSLATE: &str = "translate";
pub(crate) const MERGE: &str = "merge";

const DECOMPOSE_TEMPLATE: &str = r#"ROLE:
You are a system analyst. Break the user's query into clear, specific, atomic tasks.

USER QUERY:
"{{ query_text }}"

YOUR TASK:
1. Detect the language of the query as a short code such as "en" or "tr".
2. For every distinct piece of information needed, write one task prompt in ENGLISH
   that asks for exactly one piece of data, plus a few search keywords.
3. Output a single valid JSON object and nothing else.

EXAMPLE OUTPUT:
{"user_language": "tr", "tasks": [
  {"prompt": "Provide the capital city of Turkey.", "keywords": ["Turkey", "capital city"]},
  {"prompt": "Provide the current population of Ankara.", "keywords": ["Ankara", "population"]}
]}
"#;

const ORCHESTRATE_TEMPLATE: &str = r#"ROLE:
You are a system orchestrator. Build the final execution plan for a user's query from the
required tasks and the existing facts that were confirmed as close matches.

ORIGINAL USER QUERY:
"{{ query_text }}"

REQUIRED TASKS:
{{ tasks_json }}

AVAILABLE EXISTING FACTS:
{% for task in tasks -%}
- For the required task "{{ task.prompt }}":
{% if candidates[task.prompt] -%}
{% for candidate in candidates[task.prompt] -%}
  - Existing fact [id: {{ candidate.fact_id }}, prompt: "{{ candidate.prompt }}"]
{% endfor -%}
{% else -%}
  - No existing fact. A new one must be created.
{% endif -%}
{% endfor %}
YOUR TASK:
1. Create a "render_plan" in the user's language: an ordered list of blocks.
   - {"type": "paragraph", "content": "<literal text>"}
   - {"type": "list", "placeholder": "<name>", "item_template": "<text with {field} names>",
      "empty_message": "<text shown when no data>"}
   Every task's value is shown through a list block; its data is a list of objects.
2. Create "prediction_specs": one entry per placeholder.
   - Reuse an existing fact when its prompt matches the task: {"placeholder": "<name>", "reuse_fact_id": <id>}
   - Otherwise create one: {"placeholder": "<name>", "new_fact_prompt": "<task prompt>", "keywords": ["..."]}
3. Output a single valid JSON object with "render_plan" and "prediction_specs" and nothing else.
"#;

const EXTRACT_TEMPLATE: &str = r#"ROLE:
You are a precise data extraction engine. Answer the TASK using only the CONTEXT.

CONTEXT:
---
{{ context }}
---

TASK TO FULFILL:
{{ prompt }}

OUTPUT INSTRUCTIONS:
1. Produce the requested data, preferably as a list of objects with descriptive field names.
2. Natural-language text is translatable. Numbers, dates, booleans, symbols, or lists of them are not.
3. Output a single JSON object: {"is_translatable": <true|false>, "data": <the data>}.
4. If the context does not contain the information, output
   {"is_translatable": false, "data": {"error": "not_found"}}.
5. Never add explanations.
"#;

const TRANSLATE_TEMPLATE: &str = r#"ROLE: You are a high-fidelity translation service.
TASK: Translate the JSON below from language '{{ source_language }}' to '{{ target_language }}'.
- Keep exactly the same JSON structure: keys, lists, and objects.
- Translate only string values.
- Output only the translated, valid JSON object.

JSON TO TRANSLATE:
{{ value_json }}
"#;

const MERGE_TEMPLATE: &str = r#"ROLE:
You are an intelligence update analyst. Update an existing finding with new information.

ORIGINAL TASK:
"{{ prompt }}"

EXISTING DATA (language '{{ base_language }}'):
{{ current_json }}

NEW INFORMATION:
---
{{ context }}
---

YOUR TASK:
1. Decide whether the new information materially changes the existing data for the task.
2. If it does, output {"status": "update", "is_translatable": <true|false>, "data": <merged data in '{{ base_language }}'>}
   keeping the same structure as the existing data.
3. If it does not, output {"status": "no_change"}.
4. If the information cannot be evaluated, output {"status": "error", "message": "<reason>"}.
5. Output only the JSON object.
"#;

pub(crate) struct PromptLibrary {
    environment: Environment<'static>,
}

impl PromptLibrary {
    pub(crate) fn new() -> Result<Self, LlmError> {
        let mut environment = Environment::new();
        for (name, source) in [
            (DECOMPOSE, DECOMPOSE_TEMPLATE),
            (ORCHESTRATE, ORCHESTRATE_TEMPLATE),
            (EXTRACT, EXTRACT_TEMPLATE),
            (TRANSLATE, TRANSLATE_TEMPLATE),
            (MERGE, MERGE_TEMPLATE),
        ] {
            environment
                .add_template(name, source)
                .map_err(|error| LlmError::Prompt(format!("{name}: {error}")))?;
        }
        Ok(Self { environment })
    }

    pub(crate) fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String, LlmError> {
        self.environment
            .get_template(name)
            .and_then(|template| template.render(context))
            .map_err(|error| LlmError::Prompt(format!("{name}: {error}")))
    }
}
