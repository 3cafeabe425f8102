/// Edit distance between two strings, counted in characters.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Scores how well `search` matches `text`.
///
/// Both strings are lower-cased and split on single spaces. Every needle is
/// compared with every token: a token containing the needle scores one point,
/// otherwise a token within `distance` edits scores
/// `(token_length - edits) / token_length`. The total is divided by the
/// number of needles.
pub(crate) fn fuzzy_score(search: &str, text: &str, distance: usize) -> f64 {
    let search = search.to_lowercase();
    let text = text.to_lowercase();
    let needles: Vec<&str> = search.split(' ').collect();
    let tokens: Vec<&str> = text.split(' ').collect();

    let mut score = 0.0;
    for needle in &needles {
        for token in &tokens {
            if token.contains(needle) {
                score += 1.0;
                continue;
            }
            let d = levenshtein(needle, token);
            let length = token.chars().count();
            if d <= distance && length > 0 {
                score += (length as f64 - d as f64) / length as f64;
            }
        }
    }
    score / needles.len() as f64
}
