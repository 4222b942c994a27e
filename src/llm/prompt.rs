//! Prompt construction for generation requests.
//!
//! Composes the exact text sent to the model: a fixed instruction template,
//! a rendering of the context (hand-written block or introspected schema),
//! and the literal user question.

use crate::db::Schema;
use crate::error::{GenerationError, Result};
use crate::llm::types::Message;

/// System prompt template for the SQL assistant.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are a SQL expert. Generate a SQL query that answers the user's question against the database described below.

{context}

RULES:
1. Use explicit JOIN syntax
2. Always qualify column names with table aliases when joining
3. Include relevant WHERE clauses
4. Handle NULL values appropriately
5. Generate a single statement; never generate destructive operations unless the question explicitly asks for one

OUTPUT FORMAT:
Return ONLY the SQL query, wrapped in a ```sql code block, with no explanation."#;

/// A ready-made context block for a small clinic database. Useful for demos
/// and as the fixed-context counterpart to live schema introspection.
pub const SAMPLE_CLINIC_CONTEXT: &str = r#"Database schema:
PATIENTS (patient_id, first_name, last_name, dob, gender, phone, insurance_id)
DOCTORS (doctor_id, first_name, last_name, specialization, department_id, license_number, phone)
DEPARTMENTS (department_id, name, head_doctor_id)
APPOINTMENTS (appointment_id, patient_id, doctor_id, appointment_date, status)
MEDICAL_RECORDS (record_id, patient_id, doctor_id, diagnosis, prescription, record_date)
LAB_RESULTS (lab_id, patient_id, test_name, test_date, result_value, reference_range)"#;

/// Where the schema context in the prompt comes from.
#[derive(Debug, Clone)]
pub enum PromptContext {
    /// A hand-written domain context block, used verbatim.
    Fixed(String),
    /// The live schema, rendered via `Schema::format_for_llm`.
    Introspected,
}

impl PromptContext {
    /// Creates a fixed context from the given text.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::Fixed(text.into())
    }

    /// Renders the context block for inclusion in the prompt.
    pub fn render(&self, schema: &Schema) -> String {
        match self {
            Self::Fixed(text) => text.clone(),
            Self::Introspected => schema.format_for_llm(),
        }
    }
}

/// Composes the messages for a generation request.
///
/// Deterministic concatenation of the instruction template, the rendered
/// context and the user question. Fails closed with `PromptTooLong` when the
/// total exceeds `max_chars`; nothing is ever silently truncated.
pub fn compose(
    question: &str,
    context: &PromptContext,
    schema: &Schema,
    max_chars: usize,
) -> Result<Vec<Message>> {
    let system = SYSTEM_PROMPT_TEMPLATE.replace("{context}", &context.render(schema));

    let total = system.len() + question.len();
    if total > max_chars {
        return Err(GenerationError::PromptTooLong {
            chars: total,
            limit: max_chars,
        }
        .into());
    }

    Ok(vec![Message::system(system), Message::user(question)])
}
