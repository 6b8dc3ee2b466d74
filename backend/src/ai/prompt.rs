//! Payload construction for generation requests
//!
//! The runtime takes one free-form prompt argument, so data, instruction and
//! output-format directive are combined into a single text.

/// Directive appended after the instruction
pub const FORMAT_DIRECTIVE: &str = "Respond in CSV format only.";

/// Build the prompt sent to `<runtime> run <model> <payload>`
///
/// ```text
/// Data:
/// <csv>
///
/// Instruction:
/// <instruction>
/// Respond in CSV format only.
/// ```
pub fn build_payload(instruction: &str, csv: &str) -> String {
    format!(
        "Data:\n{data}\n\nInstruction:\n{instruction}\n{directive}",
        data = csv,
        instruction = instruction,
        directive = FORMAT_DIRECTIVE
    )
}
