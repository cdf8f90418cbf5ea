//! Method name case convention.

/// Rewrite a snake_case method name as lowerCamelCase.
///
/// Empty segments are dropped, so leading, trailing and doubled underscores
/// disappear. Names without underscores come back unchanged.
pub fn camelize_lower(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (index, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
        if index == 0 {
            out.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}
