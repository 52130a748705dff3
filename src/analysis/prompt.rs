use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisKind {
    ComplexityOnly,
    ExplainComplexity,
    Feedback,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [Self::ComplexityOnly, Self::ExplainComplexity, Self::Feedback];

    pub fn label(self) -> &'static str {
        match self {
            Self::ComplexityOnly => "complexityOnly",
            Self::ExplainComplexity => "explainComplexity",
            Self::Feedback => "feedback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub code: String,
    pub kind: AnalysisKind,
}

impl AnalysisRequest {
    pub fn prompt(&self) -> String {
        build_prompt(self.kind, &self.code)
    }
}

pub fn build_prompt(kind: AnalysisKind, code: &str) -> String {
    match kind {
        AnalysisKind::ComplexityOnly => format!(
            "Analyze the following code.\n\
             Return ONLY the Time Complexity in Big O notation, then on a NEW LINE, return ONLY the Space Complexity in Big O notation.\n\
             Also include the Recursion Stack Space Complexity if applicable (e.g., \"Stack Space: O(...)\").\n\
             Do NOT include \"Time Complexity:\", \"Space Complexity:\", or any other text, labels, or markdown.\n\
             Code:\n\n{code}"
        ),
        AnalysisKind::ExplainComplexity => format!(
            "Analyze and explain the Time Complexity and Space Complexity of the following code. \
             Provide the Big O notation for both Time and Space. Then, give a step-by-step explanation \
             for how you arrived at these complexities. Format the explanation clearly using Markdown.\n\
             Code:\n\n{code}"
        ),
        AnalysisKind::Feedback => format!(
            "Review the following code for quality. Suggest improvements regarding readability, \
             efficiency, potential bugs, and best practices. Be specific and provide examples if \
             possible. Format the response using Markdown.\n\
             Code:\n\n{code}"
        ),
    }
}
