pub fn tutor_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a helpful tutor. Using ONLY the context, answer clearly and simply.\n\nContext:\n{context}\n\nQuestion: {question}\nAnswer:"
    )
}
