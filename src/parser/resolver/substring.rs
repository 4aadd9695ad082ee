/// `%VAR:~start,length%` on characters.
///
/// A negative `start` counts from the end, a missing `length` runs to the end
/// and a negative one stops that many characters before it. Offsets past
/// either end are clamped, an empty range gives an empty string.
pub(super) fn slice(input: &str, start: i64, length: Option<i64>) -> String {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len() as i64;

    let begin = if start < 0 {
        (len + start).max(0)
    } else {
        start.min(len)
    };
    let end = match length {
        None => len,
        Some(length) if length < 0 => len + length,
        Some(length) => begin.saturating_add(length),
    }
    .min(len);

    if end <= begin {
        return String::new();
    }
    chars[begin as usize..end as usize].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::slice;

    #[test]
    fn substring() {
        assert_eq!(slice("HelloWorld", 0, Some(5)), "Hello");
        assert_eq!(slice("HelloWorld", -5, None), "World");
        assert_eq!(slice("HelloWorld", 2, None), "lloWorld");
        assert_eq!(slice("HelloWorld", -5, Some(2)), "Wo");
        assert_eq!(slice("HelloWorld", 0, Some(-5)), "Hello");
        assert_eq!(slice("HelloWorld", 5, Some(0)), "");
    }

    #[test]
    fn out_of_range() {
        assert_eq!(slice("HelloWorld", 10, None), "");
        assert_eq!(slice("HelloWorld", 12, Some(3)), "");
        assert_eq!(slice("HelloWorld", -20, Some(5)), "Hello");
        assert_eq!(slice("HelloWorld", 7, Some(100)), "rld");
        assert_eq!(slice("HelloWorld", 3, Some(-8)), "");
        assert_eq!(slice("", 0, Some(1)), "");
    }

    #[test]
    fn characters() {
        assert_eq!(slice("zażółć", 2, Some(3)), "żół");
        assert_eq!(slice(r"C:\Windows\system32\cmd.exe", -7, Some(3)), "cmd");
    }
}
