//! Pull a JSON value out of free-form LLM text
//!
//! Models wrap JSON in prose or code fences. The outermost bracketed span is
//! taken (first opener to last closer) and parsed; anything else is `None`.

use serde::de::DeserializeOwned;

fn span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// First `[` to last `]`, parsed as a list
pub fn array<T: DeserializeOwned>(text: &str) -> Option<Vec<T>> {
    serde_json::from_str(span(text, '[', ']')?).ok()
}

/// First `{` to last `}`, parsed as one object
pub fn object<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_str(span(text, '{', '}')?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Place {
        name: String,
    }

    #[test]
    fn test_array_inside_code_fence() {
        let text = "```json\n[{\"name\":\"太和殿\"},{\"name\":\"御花园\"}]\n```";
        let places: Vec<Place> = array(text).unwrap();
        assert_eq!(places.len(), 2);
        assert_eq!(places[1].name, "御花园");
    }

    #[test]
    fn test_object_with_surrounding_prose() {
        let text = "识别结果如下 {\"name\":\"雷峰塔\"} 祝您旅途愉快";
        assert_eq!(object::<Place>(text), Some(Place { name: "雷峰塔".to_string() }));
    }

    #[test]
    fn test_no_json() {
        assert!(array::<Place>("没有结果").is_none());
        assert!(object::<Place>("} reversed {").is_none());
    }

    #[test]
    fn test_wrong_shape_is_none() {
        assert!(object::<Place>("{\"title\":\"x\"}").is_none());
    }
}
