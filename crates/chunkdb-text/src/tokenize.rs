/// Lowercase, turn punctuation into whitespace, split, and drop tokens shorter
/// than two characters. Used for both indexing and queries.
pub fn tokenize(text: &str) -> Vec<String> {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().filter(|t| t.chars().count() > 1).map(str::to_string).collect()
}
