use regex::Regex;
use std::sync::LazyLock;

use crate::stream::Citations;

static CASE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        // District court criminal and civil registers
        r"(?i)\d+/Pid\.Sus/\d{4}/PN\s*[\w.]+",
        r"(?i)\d+/Pid\.B/\d{4}/PN\s*[\w.]+",
        r"(?i)\d+/Pdt\.G/\d{4}/PN\s*[\w.]+",
        // Supreme Court decisions
        r"(?i)Putusan\s+(?:MA\s+)?No\.?\s*\d+[A-Z]*/[A-Z.]+/\d{4}",
    ])
});

static LAW_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)UU\s+No\.?\s*\d+\s+Tahun\s+\d{4}",
        r"(?i)Pasal\s+\d+(?:\s+ayat\s*\(\d+\))?",
        r"(?i)SEMA\s+No\.?\s*\d+(?:/\d{4})?",
        r"(?i)PERMA\s+No\.?\s*\d+(?:/\d{4})?",
        r"(?i)PP\s+No\.?\s*\d+\s+Tahun\s+\d{4}",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                log::error!("Invalid citation pattern {}: {}", p, e);
                None
            }
        })
        .collect()
}

fn find_all(patterns: &[Regex], content: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for pattern in patterns {
        for m in pattern.find_iter(content) {
            let text = m.as_str().trim().to_string();
            if !found.contains(&text) {
                found.push(text);
            }
        }
    }
    found
}

pub fn extract_cited_cases(content: &str) -> Vec<String> {
    find_all(&CASE_PATTERNS, content)
}

pub fn extract_cited_laws(content: &str) -> Vec<String> {
    find_all(&LAW_PATTERNS, content)
}

/// Case numbers and law references mentioned in an agent's answer.
pub fn extract_citations(content: &str) -> Citations {
    Citations::new(extract_cited_cases(content), extract_cited_laws(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_case_numbers() {
        let text = "Bandingkan dengan 123/Pid.Sus/2021/PN Jkt.Sel dan Putusan MA No. 456K/PID.SUS/2019.";
        let cases = extract_cited_cases(text);
        assert_eq!(
            cases,
            vec!["123/Pid.Sus/2021/PN Jkt.Sel", "Putusan MA No. 456K/PID.SUS/2019"]
        );
    }

    #[test]
    fn test_extracts_laws_once() {
        let text = "Berdasarkan UU No. 35 Tahun 2009, Pasal 112 ayat (1) dan sekali lagi Pasal 112 ayat (1). Lihat juga SEMA No. 4/2010.";
        let laws = extract_cited_laws(text);
        assert_eq!(
            laws,
            vec!["UU No. 35 Tahun 2009", "Pasal 112 ayat (1)", "SEMA No. 4/2010"]
        );
    }

    #[test]
    fn test_no_citations() {
        assert!(extract_citations("Saya setuju dengan rekan saya.").is_empty());
    }
}
