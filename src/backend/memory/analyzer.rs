//! Text analysis for the in-memory backend / 文本分析
//!
//! Mirrors the analyzers the catalog index declares on the real engine:
//! - whitespace tokenizer + lowercase + ascii folding (search side, suggest field)
//! - edge n-gram prefixes over whitespace tokens (autocomplete on `sku` / descriptions)
//! - keyword (exact value)

use serde::{Deserialize, Serialize};

/// Field analyzer / 字段分析器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    /// Whitespace split, lowercase, ascii folding / 空白分词
    Standard,
    /// Prefixes of each token between `min` and `max` chars / 前缀 N-gram
    EdgeNgram { min: usize, max: usize },
    /// Whole value, untouched / 精确值
    Keyword,
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer::Standard
    }
}

impl Analyzer {
    pub fn edge_ngram(min: usize, max: usize) -> Self {
        Analyzer::EdgeNgram { min, max }
    }

    /// Tokens stored in the inverted index / 索引分词
    pub fn index_tokens(&self, text: &str) -> Vec<String> {
        match *self {
            Analyzer::Standard => tokenize(text),
            Analyzer::EdgeNgram { min, max } => tokenize(text)
                .iter()
                .flat_map(|token| edge_ngrams(token, min, max))
                .collect(),
            Analyzer::Keyword => vec![text.to_string()],
        }
    }

    /// Tokens produced for query text / 查询分词
    ///
    /// Edge n-gram fields are searched with the whitespace analyzer, so the
    /// query side never expands into prefixes.
    pub fn query_tokens(&self, text: &str) -> Vec<String> {
        match self {
            Analyzer::Keyword => vec![text.to_string()],
            _ => tokenize(text),
        }
    }
}

/// Whitespace tokenizer with lowercase and ascii folding / 空白分词
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| fold_ascii(&word.to_lowercase()))
        .filter(|word| !word.is_empty())
        .collect()
}

/// Prefixes of `token` from `min_n` to `max_n` chars / 生成前缀 N-gram
///
/// Example: "cemento" (2..4) -> ["ce", "cem", "ceme"]
pub fn edge_ngrams(token: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let chars: Vec<char> = token.chars().collect();
    let mut grams: Vec<String> = Vec::new();

    for n in min_n..=max_n {
        if n > chars.len() {
            break;
        }
        grams.push(chars[..n].iter().collect());
    }

    grams
}

/// Fold accented latin characters to ascii (common Spanish set) / 去除重音
pub fn fold_ascii(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'Ñ' => 'N',
            'Ç' => 'C',
            _ => c,
        })
        .collect()
}

/// Levenshtein edit distance / 编辑距离
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0usize; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);
        }
    }

    matrix[len1][len2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_folds_and_lowercases() {
        let tokens = tokenize("Hormigón  Preparado AISLANTES");
        assert_eq!(tokens, vec!["hormigon", "preparado", "aislantes"]);
    }

    #[test]
    fn test_edge_ngrams() {
        assert_eq!(edge_ngrams("cemento", 2, 4), vec!["ce", "cem", "ceme"]);
        assert!(edge_ngrams("x", 2, 15).is_empty());
        assert_eq!(edge_ngrams("a10n", 3, 20), vec!["a10", "a10n"]);
    }

    #[test]
    fn test_edge_ngram_analyzer_expands_each_token() {
        let tokens = Analyzer::edge_ngram(3, 20).index_tokens("BMBEHM2025");
        assert!(tokens.contains(&"bmbehm2025".to_string()));
        assert!(tokens.contains(&"bmb".to_string()));
        assert!(!tokens.contains(&"bm".to_string()));

        let query = Analyzer::edge_ngram(3, 20).query_tokens("bmbehM2025");
        assert_eq!(query, vec!["bmbehm2025"]);
    }

    #[test]
    fn test_keyword_is_exact() {
        assert_eq!(Analyzer::Keyword.index_tokens("Abc Def"), vec!["Abc Def"]);
        assert_eq!(Analyzer::Keyword.query_tokens("Abc Def"), vec!["Abc Def"]);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("cemento", "cemento"), 0);
        assert_eq!(levenshtein_distance("cemneto", "cemento"), 2);
        assert_eq!(levenshtein_distance("grava", "graba"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }
}
