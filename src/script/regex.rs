use std::fmt;

#[derive(Debug, Clone)]
pub(crate) struct JsRegex {
    backend: fancy_regex::Regex,
    source: String,
    flags: String,
    global: bool,
}

impl JsRegex {
    pub(crate) fn compile(pattern: &str, flags: &str) -> Result<Self, RegexError> {
        let mut case_insensitive = false;
        let mut multi_line = false;
        let mut dot_matches_new_line = false;
        let mut global = false;
        for flag in flags.chars() {
            match flag {
                'i' => case_insensitive = true,
                'm' => multi_line = true,
                's' => dot_matches_new_line = true,
                'g' => global = true,
                // Sticky and unicode flags change nothing for the subset we run.
                'y' | 'u' => {}
                other => {
                    return Err(RegexError {
                        message: format!("invalid regular expression flag '{other}'"),
                    });
                }
            }
        }
        let mut builder = fancy_regex::RegexBuilder::new(pattern);
        builder.case_insensitive(case_insensitive);
        builder.multi_line(multi_line);
        builder.dot_matches_new_line(dot_matches_new_line);
        let backend = builder.build().map_err(RegexError::from)?;
        Ok(Self {
            backend,
            source: pattern.to_string(),
            flags: flags.to_string(),
            global,
        })
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn flags(&self) -> &str {
        &self.flags
    }

    pub(crate) fn is_global(&self) -> bool {
        self.global
    }

    pub(crate) fn is_match(&self, input: &str) -> Result<bool, RegexError> {
        self.backend.is_match(input).map_err(RegexError::from)
    }

    pub(crate) fn find(&self, input: &str) -> Result<Option<Match>, RegexError> {
        let matched = self.backend.find(input).map_err(RegexError::from)?;
        Ok(matched.map(Match::from_backend))
    }

    pub(crate) fn find_all(&self, input: &str) -> Result<Vec<Match>, RegexError> {
        let mut out = Vec::new();
        for matched in self.backend.find_iter(input) {
            let matched = matched.map_err(RegexError::from)?;
            out.push(Match::from_backend(matched));
        }
        Ok(out)
    }

    pub(crate) fn captures(&self, input: &str) -> Result<Option<Captures>, RegexError> {
        let captures = self.backend.captures(input).map_err(RegexError::from)?;
        Ok(captures.as_ref().map(Captures::from_backend))
    }

    pub(crate) fn captures_all(&self, input: &str) -> Result<Vec<Captures>, RegexError> {
        let mut out = Vec::new();
        for captures in self.backend.captures_iter(input) {
            let captures = captures.map_err(RegexError::from)?;
            out.push(Captures::from_backend(&captures));
        }
        Ok(out)
    }

    pub(crate) fn split_all(&self, input: &str) -> Result<Vec<String>, RegexError> {
        let mut out = Vec::new();
        for part in self.backend.split(input) {
            out.push(part.map_err(RegexError::from)?.to_string());
        }
        Ok(out)
    }

    pub(crate) fn replace(&self, input: &str, replacement: &str) -> Result<String, RegexError> {
        let matches = if self.global {
            self.captures_all(input)?
        } else {
            self.captures(input)?.into_iter().collect()
        };
        let mut out = String::with_capacity(input.len());
        let mut cursor = 0;
        for captures in &matches {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            out.push_str(&input[cursor..whole.start()]);
            expand_replacement(replacement, captures, &mut out);
            cursor = whole.end();
        }
        out.push_str(&input[cursor..]);
        Ok(out)
    }
}

// $&, $1..$99 and $$ in a replacement string.
fn expand_replacement(template: &str, captures: &Captures, out: &mut String) {
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'$' => {
                    out.push('$');
                    i += 2;
                    continue;
                }
                b'&' => {
                    if let Some(whole) = captures.get(0) {
                        out.push_str(whole.as_str());
                    }
                    i += 2;
                    continue;
                }
                d if d.is_ascii_digit() => {
                    let mut index = usize::from(d - b'0');
                    let mut consumed = 2;
                    if let Some(&d2) = bytes.get(i + 2) {
                        if d2.is_ascii_digit() && captures.len() > index * 10 + usize::from(d2 - b'0')
                        {
                            index = index * 10 + usize::from(d2 - b'0');
                            consumed = 3;
                        }
                    }
                    if index > 0 && index < captures.len() {
                        if let Some(group) = captures.get(index) {
                            out.push_str(group.as_str());
                        }
                        i += consumed;
                        continue;
                    }
                }
                _ => {}
            }
        }
        let rest = &template[i..];
        if let Some(ch) = rest.chars().next() {
            out.push(ch);
            i += ch.len_utf8();
        } else {
            break;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Captures {
    groups: Vec<Option<Match>>,
}

impl Captures {
    fn from_backend(captures: &fancy_regex::Captures<'_>) -> Self {
        let mut groups = Vec::with_capacity(captures.len());
        for idx in 0..captures.len() {
            let matched = captures.get(idx).map(Match::from_backend);
            groups.push(matched);
        }
        Self { groups }
    }

    pub(crate) fn len(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Match> {
        self.groups.get(index).and_then(Option::as_ref)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Match {
    start: usize,
    end: usize,
    text: String,
}

impl Match {
    fn from_backend(matched: fancy_regex::Match<'_>) -> Self {
        Self {
            start: matched.start(),
            end: matched.end(),
            text: matched.as_str().to_string(),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegexError {
    message: String,
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RegexError {}

impl From<fancy_regex::Error> for RegexError {
    fn from(value: fancy_regex::Error) -> Self {
        Self {
            message: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_drive_matching() {
        let re = JsRegex::compile("abc", "i").unwrap();
        assert!(re.is_match("xxABCyy").unwrap());
        assert!(!re.is_global());

        let re = JsRegex::compile("a.", "gs").unwrap();
        assert!(re.is_global());
        assert_eq!(re.find_all("a\na-").unwrap().len(), 2);

        assert!(JsRegex::compile("a", "q").is_err());
        assert!(JsRegex::compile("(", "").is_err());
    }

    #[test]
    fn replace_expands_group_references() {
        let re = JsRegex::compile("(\\w+)@(\\w+)", "").unwrap();
        assert_eq!(
            re.replace("mail: user@host", "$2/$1").unwrap(),
            "mail: host/user"
        );

        let re = JsRegex::compile("\\d+", "g").unwrap();
        assert_eq!(re.replace("a1b22c", "[$&]").unwrap(), "a[1]b[22]c");
        assert_eq!(re.replace("a1b2", "$$").unwrap(), "a$b$");
    }

    #[test]
    fn non_global_replace_stops_after_first_match() {
        let re = JsRegex::compile("o", "").unwrap();
        assert_eq!(re.replace("foo", "0").unwrap(), "f0o");
    }

    #[test]
    fn split_keeps_outer_empty_parts() {
        let re = JsRegex::compile(",", "").unwrap();
        assert_eq!(re.split_all(",a,b,").unwrap(), vec!["", "a", "b", ""]);
    }
}
