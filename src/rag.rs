use crate::chat::{call_gemini_chat, TextGenerator};
use crate::messages::ChatTurn;
use crate::retriever::{RetrievedDocument, Retriever};
use anyhow::Result;
use log::{debug, info};
use std::io::{BufRead, Write};

pub const MODEL_NAME: &str = "gemini-1.5-flash";
pub const MODEL_PROVIDER: &str = "google";

pub const RAG_SYSTEM_PROMPT: &str = "You are an assistant for question-answering tasks.
Use the following pieces of retrieved context to answer the latest question in the conversation.
If you don't know the answer, just say that you don't know.
Use three sentences maximum and keep the answer concise.
";

/// Join retrieved texts with blank lines, in retrieval order
pub fn format_documents(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|doc| doc.text.as_str())
        .collect::<Vec<&str>>()
        .join("\n\n")
}

/// System instruction followed by the context and the question
pub fn build_messages(question: &str, context: &str) -> Vec<ChatTurn> {
    vec![
        ChatTurn::system(RAG_SYSTEM_PROMPT),
        ChatTurn::user(format!("Context: {}\n\nQuestion: {}", context, question)),
    ]
}

/// RAG (Retrieval-Augmented Generation) pipeline
pub struct RagPipeline<G, R> {
    generator: G,
    retriever: R,
    model: String,
}

impl<G: TextGenerator, R: Retriever> RagPipeline<G, R> {
    /// Create a new pipeline answering with [`MODEL_NAME`]
    pub fn new(generator: G, retriever: R) -> Self {
        RagPipeline {
            generator,
            retriever,
            model: MODEL_NAME.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Fetch the documents relevant to a question
    pub async fn retrieve_documents(&self, question: &str) -> Result<Vec<RetrievedDocument>> {
        let documents = self.retriever.retrieve(question).await?;
        info!("Retrieved {} documents", documents.len());
        Ok(documents)
    }

    /// Ask the model to answer from the retrieved documents
    pub async fn generate_response(
        &self,
        question: &str,
        documents: &[RetrievedDocument],
    ) -> Result<String> {
        let messages = build_messages(question, &format_documents(documents));
        debug!(
            "Generating answer with provider={} model={}",
            MODEL_PROVIDER, self.model
        );
        call_gemini_chat(&self.generator, &self.model, &messages, 0.0).await
    }

    /// Answer a question from the indexed documents
    pub async fn answer(&self, question: &str) -> Result<String> {
        let documents = self.retrieve_documents(question).await?;
        self.generate_response(question, &documents).await
    }

    /// Read questions line by line until `exit` or end of input
    pub async fn run_query_loop<I: BufRead, O: Write>(&self, input: I, mut output: O) -> Result<()> {
        info!("Ready to answer questions. Type 'exit' to quit.");

        let mut lines = input.lines();
        loop {
            write!(output, "\nYour question: ")?;
            output.flush()?;

            let Some(line) = lines.next() else {
                break;
            };
            let line = line?;
            let question = line.trim();

            if question.eq_ignore_ascii_case("exit") {
                info!("Goodbye!");
                break;
            }
            if question.is_empty() {
                continue;
            }

            let answer = self.answer(question).await?;
            writeln!(output, "\n{}", answer)?;
        }

        Ok(())
    }
}
