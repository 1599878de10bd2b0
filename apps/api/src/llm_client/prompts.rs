// Shared prompt fragments used across generation stages.
// Stage-specific templates live in generation::prompts.

/// Persona every article prompt opens with.
pub const EXPERT_PERSONA: &str = "You are an SEO content strategist and a practising \
    psychotherapist writing for a Romanian-language mental health blog.";

/// Appended to every prompt that expects a structured answer.
pub const JSON_ONLY_INSTRUCTION: &str = "Respond with a single valid JSON object only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Make sure the JSON is complete and not truncated.";

/// Language directive for anything the reader will see.
pub const ROMANIAN_OUTPUT_INSTRUCTION: &str =
    "All human-readable text you produce must be written in Romanian.";
