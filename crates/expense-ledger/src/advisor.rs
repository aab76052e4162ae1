//! Streaming financial advice over an explicit per-call context
//!
//! The advisor is stateless: every call carries the full user context it
//! may mention, and no conversation history is kept anywhere. Chunks are
//! cleaned for a plain-text UI before they leave this module.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::debug;

use crate::config::GeminiConfig;
use crate::error::Result;
use crate::providers::{GenerativeModel, TextStream};

/// A transaction line shown to the model.
#[derive(Debug, Clone)]
pub struct TransactionLine {
    pub category: String,
    pub amount: f64,
    pub description: String,
}

/// One category's share of total spending.
#[derive(Debug, Clone)]
pub struct CategoryShare {
    pub category: String,
    pub total: f64,
    pub percentage: f64,
}

/// Everything the advisor knows about a user for one call. Assembled by
/// the caller; the advisor itself reads nothing from storage.
#[derive(Debug, Clone, Default)]
pub struct AdvisorContext {
    pub user_id: String,
    pub username: String,
    /// Absent when the user never set one; the budget section is omitted.
    pub budget: Option<f64>,
    pub total_spent: f64,
    pub total_transactions: u64,
    pub categories: Vec<String>,
    pub recent_transactions: Vec<TransactionLine>,
    pub top_categories: Vec<CategoryShare>,
}

/// Stateless streaming advice calls.
pub struct SpendingAdvisor {
    model: Arc<dyn GenerativeModel>,
    advisor_model: String,
}

impl SpendingAdvisor {
    pub fn new(model: Arc<dyn GenerativeModel>, config: &GeminiConfig) -> Self {
        Self {
            model,
            advisor_model: config.advisor_model.clone(),
        }
    }

    /// Stream advice chunks for one question. Each chunk arrives trimmed
    /// with markdown asterisks removed; empty chunks are dropped.
    pub async fn advise(&self, question: &str, context: &AdvisorContext) -> Result<TextStream> {
        let prompt = build_prompt(question, context);
        debug!(user = %context.user_id, model = %self.advisor_model, "starting advice stream");

        let stream = self
            .model
            .generate_stream(&self.advisor_model, &prompt)
            .await?;

        let cleaned = stream.filter_map(|chunk| async move {
            match chunk {
                Ok(text) => {
                    let cleaned = text.trim().replace('*', "");
                    if cleaned.is_empty() {
                        None
                    } else {
                        Some(Ok(cleaned))
                    }
                }
                Err(e) => Some(Err(e)),
            }
        });

        Ok(cleaned.boxed())
    }

    /// Collect the whole advice reply into one string.
    pub async fn advise_text(&self, question: &str, context: &AdvisorContext) -> Result<String> {
        let mut stream = self.advise(question, context).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            reply.push_str(&chunk?);
        }
        Ok(reply)
    }
}

/// Build the context-aware system prompt
fn build_prompt(question: &str, context: &AdvisorContext) -> String {
    let mut prompt = String::new();

    prompt.push_str("You are a helpful financial assistant for an expense management application.\n\n");

    prompt.push_str("User's Financial Context:\n");
    prompt.push_str(&format!("- User ID: {}\n", context.user_id));
    prompt.push_str(&format!("- Username: {}\n", context.username));

    if let Some(budget) = context.budget {
        let remaining = (budget - context.total_spent).max(0.0);
        let utilization = if budget > 0.0 {
            (context.total_spent / budget * 100.0).min(100.0)
        } else {
            0.0
        };
        prompt.push_str("\nBudget Information:\n");
        prompt.push_str(&format!("- Budget: ${:.2}\n", budget));
        prompt.push_str(&format!("- Total Spent: ${:.2}\n", context.total_spent));
        prompt.push_str(&format!("- Remaining Budget: ${:.2}\n", remaining));
        prompt.push_str(&format!("- Budget Utilization: {:.1}%\n", utilization));
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "- Total Transactions: {}\n",
        context.total_transactions
    ));
    prompt.push_str(&format!(
        "- Available Categories: {}\n",
        context.categories.join(", ")
    ));

    if !context.recent_transactions.is_empty() {
        prompt.push_str(&format!(
            "\nRecent Transactions ({} items):\n",
            context.recent_transactions.len()
        ));
        for t in context.recent_transactions.iter().take(5) {
            prompt.push_str(&format!(
                "- {}: ${:.2} ({})\n",
                t.category, t.amount, t.description
            ));
        }
    }

    if !context.top_categories.is_empty() {
        prompt.push_str("\nTop Spending Categories:\n");
        for c in context.top_categories.iter().take(3) {
            prompt.push_str(&format!(
                "- {}: ${:.2} ({:.1}%)\n",
                c.category, c.total, c.percentage
            ));
        }
    }

    prompt.push_str("\nHelp the user with their expense management questions, provide insights about their spending,\n");
    prompt.push_str("and assist with financial planning based on their transaction history and budget information.\n");
    prompt.push_str("Be specific with dollar amounts and percentages when providing advice.\n\n");

    prompt.push_str(&format!("User Question: {}\n", question));

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::MediaPart;
    use parking_lot::Mutex;

    struct StreamingModel {
        chunks: Vec<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl StreamingModel {
        fn with_chunks(chunks: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl GenerativeModel for StreamingModel {
        async fn generate(
            &self,
            _model: &str,
            _prompt: &str,
            _media: Option<MediaPart>,
        ) -> Result<String> {
            Err(Error::model("not scripted"))
        }

        async fn generate_stream(&self, _model: &str, prompt: &str) -> Result<TextStream> {
            self.prompts.lock().push(prompt.to_string());
            let chunks: Vec<Result<String>> = self.chunks.iter().cloned().map(Ok).collect();
            Ok(futures_util::stream::iter(chunks).boxed())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "streaming"
        }
    }

    fn context() -> AdvisorContext {
        AdvisorContext {
            user_id: "u-1".into(),
            username: "alice".into(),
            budget: Some(500.0),
            total_spent: 125.5,
            total_transactions: 12,
            categories: vec!["Food".into(), "Travel".into()],
            recent_transactions: vec![TransactionLine {
                category: "Food".into(),
                amount: 4.5,
                description: "espresso".into(),
            }],
            top_categories: vec![CategoryShare {
                category: "Food".into(),
                total: 90.0,
                percentage: 71.7,
            }],
        }
    }

    #[tokio::test]
    async fn chunks_are_trimmed_deasterisked_and_filtered() {
        let model = StreamingModel::with_chunks(&["**Spend** less \n", "   ", "on *coffee*"]);
        let advisor = SpendingAdvisor::new(model, &GeminiConfig::default());

        let mut stream = advisor.advise("help", &context()).await.unwrap();
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        assert_eq!(chunks, vec!["Spend less", "on coffee"]);
    }

    #[tokio::test]
    async fn prompt_carries_budget_and_context_sections() {
        let model = StreamingModel::with_chunks(&["ok"]);
        let advisor = SpendingAdvisor::new(model.clone(), &GeminiConfig::default());
        advisor.advise_text("Am I over budget?", &context()).await.unwrap();

        let prompts = model.prompts.lock();
        let prompt = &prompts[0];
        assert!(prompt.contains("- User ID: u-1"));
        assert!(prompt.contains("- Username: alice"));
        assert!(prompt.contains("- Budget: $500.00"));
        assert!(prompt.contains("- Total Spent: $125.50"));
        assert!(prompt.contains("- Remaining Budget: $374.50"));
        assert!(prompt.contains("- Budget Utilization: 25.1%"));
        assert!(prompt.contains("- Total Transactions: 12"));
        assert!(prompt.contains("- Available Categories: Food, Travel"));
        assert!(prompt.contains("- Food: $4.50 (espresso)"));
        assert!(prompt.contains("- Food: $90.00 (71.7%)"));
        assert!(prompt.contains("User Question: Am I over budget?"));
    }

    #[tokio::test]
    async fn unset_budget_omits_the_budget_section() {
        let model = StreamingModel::with_chunks(&["ok"]);
        let advisor = SpendingAdvisor::new(model.clone(), &GeminiConfig::default());

        let mut ctx = context();
        ctx.budget = None;
        advisor.advise_text("hi", &ctx).await.unwrap();

        let prompts = model.prompts.lock();
        assert!(!prompts[0].contains("Budget Information"));
        assert!(prompts[0].contains("- Total Transactions: 12"));
    }

    #[tokio::test]
    async fn recent_and_top_lists_are_capped() {
        let model = StreamingModel::with_chunks(&["ok"]);
        let advisor = SpendingAdvisor::new(model.clone(), &GeminiConfig::default());

        let mut ctx = context();
        ctx.recent_transactions = (0..8)
            .map(|i| TransactionLine {
                category: format!("Cat{}", i),
                amount: i as f64,
                description: "d".into(),
            })
            .collect();
        ctx.top_categories = (0..6)
            .map(|i| CategoryShare {
                category: format!("Top{}", i),
                total: i as f64,
                percentage: 10.0,
            })
            .collect();
        advisor.advise_text("hi", &ctx).await.unwrap();

        let prompts = model.prompts.lock();
        let prompt = &prompts[0];
        assert!(prompt.contains("Recent Transactions (8 items):"));
        assert!(prompt.contains("- Cat4: $4.00 (d)"));
        assert!(!prompt.contains("- Cat5: $5.00 (d)"));
        assert!(prompt.contains("- Top2: $2.00 (10.0%)"));
        assert!(!prompt.contains("- Top3: $3.00 (10.0%)"));
    }

    #[tokio::test]
    async fn advise_text_concatenates_cleaned_chunks() {
        let model = StreamingModel::with_chunks(&["Cut back ", "on dining *out*."]);
        let advisor = SpendingAdvisor::new(model, &GeminiConfig::default());

        let reply = advisor.advise_text("advice?", &context()).await.unwrap();
        assert_eq!(reply, "Cut backon dining out.");
    }
}
