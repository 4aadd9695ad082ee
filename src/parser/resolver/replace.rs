use regex::{NoExpand, Regex};

/// `%VAR:search=replacement%`. Matching ignores case and every occurrence is
/// replaced. With a leading `*` everything up to and including the first
/// match is replaced instead. An empty search leaves the value unchanged.
pub(super) fn replace(input: &str, search: &str, replacement: &str) -> String {
    let (through_first, search) = match search.strip_prefix('*') {
        Some(search) => (true, search),
        None => (false, search),
    };
    if search.is_empty() {
        return input.to_string();
    }

    let ci_pattern = format!("(?i){}", regex::escape(search));
    let re = match Regex::new(&ci_pattern) {
        Ok(re) => re,
        Err(err) => {
            log::warn!("{err}");
            return input.to_string();
        }
    };

    if through_first {
        match re.find(input) {
            Some(found) => format!("{}{}", replacement, &input[found.end()..]),
            None => input.to_string(),
        }
    } else {
        re.replace_all(input, NoExpand(replacement)).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::replace;

    #[test]
    fn test_replace() {
        assert_eq!(replace("Hello World", "World", "cmd"), "Hello cmd");
        assert_eq!(replace("one two One two", "one", "1"), "1 two 1 two");
        assert_eq!(replace("ie4-uinit", "-", ""), "ie4uinit");
        assert_eq!(replace("a.b.c", ".", "$1"), "a$1b$1c");
        assert_eq!(replace("abc", "", "x"), "abc");
        assert_eq!(replace("abc", "z", "x"), "abc");
    }

    #[test]
    fn test_replace_through_first() {
        assert_eq!(replace("junk::ie4uinit", "*::", ""), "ie4uinit");
        assert_eq!(replace("aXbXc", "*x", "_"), "_bXc");
        assert_eq!(replace("abc", "*z", "_"), "abc");
        assert_eq!(replace("abc", "*", "_"), "abc");
    }
}
