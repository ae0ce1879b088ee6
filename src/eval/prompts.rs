use crate::corpus::types::QuestionRecord;

use super::DimensionScores;

pub const JUDGE_SYSTEM_PROMPT: &str = r#"You are a rigorous technical interviewer grading one answer from a spreadsheet skills interview.

Grade the candidate's answer on four dimensions, each a number from 0 to 5 (decimals allowed):
- accuracy: is what they said correct, and does it hit the expected concepts?
- completeness: how much of the expected ground does the answer cover?
- clarity: is it easy to follow, concrete and well structured?
- depth: does it show knowledge beyond the basics (modern functions, edge cases, trade-offs)?

You are given a rule-based baseline score for each dimension. Use it as a reference point, not a ceiling. Do not reward length on its own. An empty or evasive answer scores 0 everywhere.

Reply with a single JSON object and nothing else:
{"accuracy": <0-5>, "completeness": <0-5>, "clarity": <0-5>, "depth": <0-5>, "feedback": "<one or two sentences>", "corrections": ["<optional short correction>", ...]}
"#;

/// User payload for one grading request.
pub fn judge_request(answer: &str, question: &QuestionRecord, baseline: &DimensionScores) -> String {
    serde_json::json!({
        "question": question.prompt,
        "expected_elements": question.expected_elements,
        "key_terms": question.keywords,
        "reference_answer": question.model_answer,
        "answer": answer,
        "baseline_scores": baseline,
    })
    .to_string()
}

pub const HINT_SYSTEM_PROMPT: &str = r#"You are a supportive interviewer in a spreadsheet skills interview. The candidate asked for a hint.

Give one subtle nudge toward the concepts listed. Never state the answer, a full formula, or step-by-step instructions. Keep it to one sentence.

Reply with a single JSON object and nothing else:
{"hint": "<one sentence>"}
"#;

/// User payload for one hint request.
pub fn hint_request(question: &QuestionRecord) -> String {
    serde_json::json!({
        "question": question.prompt,
        "concepts_required": question.expected_elements,
        "key_terms": question.keywords,
    })
    .to_string()
}
