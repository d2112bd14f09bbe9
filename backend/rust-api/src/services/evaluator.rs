//! Answer grading. Everything here is a pure function: the session engine
//! decides when to grade, this module only decides what a submission is
//! worth.

use std::collections::HashMap;

use crate::models::Question;

/// Canonical text form: lowercase, Latin diacritics folded, punctuation
/// dropped, whitespace collapsed to single spaces. Idempotent.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for ch in text.chars().flat_map(char::to_lowercase) {
        let ch = fold_diacritic(ch);
        if ch.is_alphanumeric() {
            folded.push(ch);
        } else {
            folded.push(' ');
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => 'i',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' => 'u',
        'ý' | 'ÿ' => 'y',
        'š' | 'ś' => 's',
        'ž' | 'ź' | 'ż' => 'z',
        'ß' => 's',
        other => other,
    }
}

/// Similarity of a written answer against the reference, in [0, 100].
///
/// Both sides are normalized and tokenized; tokens pair up greedily, exact
/// matches first, then near matches one edit apart (so "closures" still
/// pairs with "closure"). The score is the Dice overlap of paired tokens.
/// Identical non-empty inputs score 100; an empty side scores 0.
pub fn match_percent(user_answer: &str, official_answer: &str) -> f64 {
    let user = normalize(user_answer);
    let official = normalize(official_answer);
    if user.is_empty() || official.is_empty() {
        return 0.0;
    }
    if user == official {
        return 100.0;
    }

    let user_tokens: Vec<&str> = user.split(' ').collect();
    let official_tokens: Vec<&str> = official.split(' ').collect();

    // Multiset of reference tokens still available for pairing.
    let mut available: HashMap<&str, usize> = HashMap::new();
    for tok in &official_tokens {
        *available.entry(tok).or_insert(0) += 1;
    }

    let mut matched = 0usize;
    let mut unmatched = Vec::new();
    for tok in &user_tokens {
        match available.get_mut(tok) {
            Some(count) if *count > 0 => {
                *count -= 1;
                matched += 1;
            }
            _ => unmatched.push(*tok),
        }
    }

    for tok in unmatched {
        let near = available
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(candidate, _)| *candidate)
            .find(|candidate| levenshtein(tok, candidate) <= 1);
        if let Some(candidate) = near {
            *available.get_mut(candidate).unwrap() -= 1;
            matched += 1;
        }
    }

    200.0 * matched as f64 / (user_tokens.len() + official_tokens.len()) as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// True iff exactly the one correct option is selected.
pub fn evaluate_single_choice(question: &Question, selected_ids: &[String]) -> bool {
    let correct = question.correct_option_ids();
    selected_ids.len() == 1 && correct.len() == 1 && selected_ids[0] == correct[0]
}

/// True iff the selected set equals the correct set: no extras, no
/// omissions. An empty selection is always false.
pub fn evaluate_multi_choice(question: &Question, selected_ids: &[String]) -> bool {
    if selected_ids.is_empty() {
        return false;
    }
    let correct: std::collections::HashSet<&str> =
        question.correct_option_ids().into_iter().collect();
    let selected: std::collections::HashSet<&str> =
        selected_ids.iter().map(String::as_str).collect();
    !correct.is_empty() && selected == correct
}

/// Grades a written answer against the question's official answer. A
/// missing official answer grades as the empty string (0%); surfacing that
/// misconfiguration is the caller's job.
pub fn evaluate_written(question: &Question, user_text: &str, threshold: u8) -> (f64, bool) {
    let official = question.official_answer.as_deref().unwrap_or("");
    let percent = match_percent(user_text, official);
    (percent, percent >= threshold as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{QuestionKind, QuestionLevel, QuestionOption};

    fn choice_question(option_flags: &[(&str, bool)]) -> Question {
        Question {
            id: "q1".to_string(),
            topic_id: "t1".to_string(),
            kind: QuestionKind::SingleChoice,
            level: QuestionLevel::Basic,
            text: "pick".to_string(),
            official_answer: None,
            options: option_flags
                .iter()
                .map(|(id, is_correct)| QuestionOption {
                    id: id.to_string(),
                    text: format!("option {}", id),
                    is_correct: *is_correct,
                })
                .collect(),
        }
    }

    fn written_question(official: Option<&str>) -> Question {
        Question {
            id: "w1".to_string(),
            topic_id: "t1".to_string(),
            kind: QuestionKind::Written,
            level: QuestionLevel::Intermediate,
            text: "explain".to_string(),
            official_answer: official.map(str::to_string),
            options: Vec::new(),
        }
    }

    fn selected(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_is_case_accent_and_punctuation_insensitive() {
        assert_eq!(normalize("Café!"), normalize("cafe"));
        assert_eq!(normalize("  Hello,\tWORLD  "), "hello world");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["Café!", "  A   b\nC. ", "żółć", ""] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn match_percent_identity_is_100() {
        for text in ["closure", "A closure captures variables", "Café"] {
            assert_eq!(match_percent(text, text), 100.0);
        }
    }

    #[test]
    fn match_percent_empty_side_is_0() {
        assert_eq!(match_percent("", "anything"), 0.0);
        assert_eq!(match_percent("anything", ""), 0.0);
        assert_eq!(match_percent("!!!", "anything"), 0.0);
    }

    #[test]
    fn match_percent_grows_with_overlap() {
        let official = "a closure captures variables from its enclosing scope";
        let close = match_percent("closures capture variables from the enclosing scope", official);
        let far = match_percent("monads are burritos", official);
        assert!(close > far);
        assert!(close >= 80.0);
    }

    #[test]
    fn single_choice_requires_exactly_the_correct_option() {
        let q = choice_question(&[("a", false), ("b", true), ("c", false)]);
        assert!(evaluate_single_choice(&q, &selected(&["b"])));
        assert!(!evaluate_single_choice(&q, &selected(&["a"])));
        assert!(!evaluate_single_choice(&q, &selected(&["a", "b"])));
        assert!(!evaluate_single_choice(&q, &selected(&[])));
    }

    #[test]
    fn multi_choice_rejects_subsets_and_supersets() {
        let q = choice_question(&[("a", true), ("b", true), ("c", true), ("d", false)]);
        assert!(evaluate_multi_choice(&q, &selected(&["c", "a", "b"])));
        assert!(!evaluate_multi_choice(&q, &selected(&["a", "b"])));
        assert!(!evaluate_multi_choice(&q, &selected(&["a", "b", "c", "d"])));
        assert!(!evaluate_multi_choice(&q, &selected(&[])));
    }

    #[test]
    fn written_grading_applies_threshold() {
        let q = written_question(Some("A closure captures variables from its enclosing scope"));
        let (percent, correct) =
            evaluate_written(&q, "closures capture variables from the enclosing scope", 80);
        assert!(percent >= 80.0);
        assert!(correct);

        let (percent, correct) = evaluate_written(&q, "no idea", 80);
        assert!(percent < 80.0);
        assert!(!correct);
    }

    #[test]
    fn written_grading_treats_missing_official_answer_as_zero() {
        let q = written_question(None);
        let (percent, correct) = evaluate_written(&q, "anything at all", 80);
        assert_eq!(percent, 0.0);
        assert!(!correct);
    }
}
