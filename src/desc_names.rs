//! Descriptor string helpers: JVM-style type descriptors
//! (`Ljava/lang/String;`, `[I`, `V`), java declarations, shorties, and the
//! `*`-wildcard shorty matching used by proto-shape queries.

/// Human readable name for a primitive type character.
pub fn primitive_type_name(type_char: char) -> Option<&'static str> {
    Some(match type_char {
        'B' => "byte",
        'C' => "char",
        'D' => "double",
        'F' => "float",
        'I' => "int",
        'J' => "long",
        'S' => "short",
        'V' => "void",
        'Z' => "boolean",
        _ => return None,
    })
}

/// Shorty character for a full type descriptor: every reference and array
/// type collapses to `L`.
pub fn descriptor_to_shorty(descriptor: &str) -> char {
    match descriptor.as_bytes().first() {
        Some(b'[') | Some(b'L') => 'L',
        Some(&c) => c as char,
        None => '*',
    }
}

/// Converts a java declaration into a type descriptor.
///
/// `"java.lang.String"` becomes `"Ljava/lang/String;"`, `"int[]"` becomes
/// `"[I"`.
pub fn decl_to_descriptor(decl: &str) -> String {
    let dimensions = decl.matches('[').count();
    let element = decl.split('[').next().unwrap_or("").trim();
    let mut desc = String::with_capacity(element.len() + dimensions + 2);
    for _ in 0..dimensions {
        desc.push('[');
    }
    match element {
        "byte" => desc.push('B'),
        "char" => desc.push('C'),
        "double" => desc.push('D'),
        "float" => desc.push('F'),
        "int" => desc.push('I'),
        "long" => desc.push('J'),
        "short" => desc.push('S'),
        "void" => desc.push('V'),
        "boolean" => desc.push('Z'),
        _ => {
            desc.push('L');
            for c in element.chars() {
                desc.push(if c == '.' { '/' } else { c });
            }
            desc.push(';');
        }
    }
    desc
}

/// Splits a concatenated parameter descriptor list into single descriptors.
///
/// `"I[JLjava/lang/String;"` yields `["I", "[J", "Ljava/lang/String;"]`.
pub fn extract_param_descriptors(descriptors: &str) -> Vec<String> {
    let bytes = descriptors.as_bytes();
    let mut params = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let start = pos;
        while pos < bytes.len() && bytes[pos] == b'[' {
            pos += 1;
        }
        match bytes.get(pos) {
            Some(b'L') => {
                while pos < bytes.len() && bytes[pos] != b';' {
                    pos += 1;
                }
                pos += 1;
            }
            Some(_) => pos += 1,
            None => break,
        }
        if pos <= bytes.len() {
            params.push(descriptors[start..pos].to_string());
        }
    }
    params
}

/// Builds a match-shorty out of an optional return descriptor and optional
/// parameter descriptors; `None` entries become the `*` wildcard.
pub fn to_match_shorty(return_type: Option<&str>, params: &[Option<String>]) -> String {
    let mut shorty = String::with_capacity(params.len() + 1);
    match return_type {
        Some(desc) => shorty.push(descriptor_to_shorty(desc)),
        None => shorty.push('*'),
    }
    for param in params {
        match param {
            Some(desc) => shorty.push(descriptor_to_shorty(desc)),
            None => shorty.push('*'),
        }
    }
    shorty
}

/// Matches a match-shorty (may contain `*`) against a method shorty.
pub fn shorty_descriptor_match(match_shorty: &str, method_shorty: &str) -> bool {
    if match_shorty.len() != method_shorty.len() {
        return false;
    }
    match_shorty
        .bytes()
        .zip(method_shorty.bytes())
        .all(|(m, s)| m == b'*' || m == s)
}

/// Splits `Lfoo/Bar;->name(I[J)V` into class, name, raw parameter
/// descriptors, and return descriptor.
pub fn split_method_descriptor(desc: &str) -> Option<(&str, &str, &str, &str)> {
    let arrow = desc.find("->")?;
    let open = desc.find('(')?;
    let close = desc.find(')')?;
    if open < arrow + 2 || close < open {
        return None;
    }
    Some((
        &desc[..arrow],
        &desc[arrow + 2..open],
        &desc[open + 1..close],
        &desc[close + 1..],
    ))
}

/// Splits `Lfoo/Bar;->name:Ljava/lang/String;` into class, name, and type.
pub fn split_field_descriptor(desc: &str) -> Option<(&str, &str, &str)> {
    let arrow = desc.find("->")?;
    let colon = desc[arrow..].find(':')? + arrow;
    Some((&desc[..arrow], &desc[arrow + 2..colon], &desc[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decl_to_descriptor() {
        assert_eq!(decl_to_descriptor("java.lang.String"), "Ljava/lang/String;");
        assert_eq!(decl_to_descriptor("int[]"), "[I");
        assert_eq!(decl_to_descriptor("long[][]"), "[[J");
        assert_eq!(decl_to_descriptor("void"), "V");
    }

    #[test]
    fn test_extract_param_descriptors() {
        assert_eq!(
            extract_param_descriptors("I[JLjava/lang/String;"),
            vec!["I", "[J", "Ljava/lang/String;"]
        );
        assert_eq!(
            extract_param_descriptors("[[Ljava/util/List;Z"),
            vec!["[[Ljava/util/List;", "Z"]
        );
        assert!(extract_param_descriptors("").is_empty());
    }

    #[test]
    fn test_shorty_match() {
        assert!(shorty_descriptor_match("**IL", "ILIL"));
        assert!(!shorty_descriptor_match("**IL", "ILI"));
        assert!(!shorty_descriptor_match("VI", "VL"));
        assert_eq!(
            to_match_shorty(Some("V"), &[Some("I".into()), Some("[I".into()), None]),
            "VIL*"
        );
    }

    #[test]
    fn test_split_method_descriptor() {
        let (class, name, params, ret) =
            split_method_descriptor("Lcom/a/B;->run(I[J)Ljava/lang/String;").unwrap();
        assert_eq!(class, "Lcom/a/B;");
        assert_eq!(name, "run");
        assert_eq!(params, "I[J");
        assert_eq!(ret, "Ljava/lang/String;");
        assert!(split_method_descriptor("Lcom/a/B;").is_none());
    }

    #[test]
    fn test_split_field_descriptor() {
        let (class, name, ty) = split_field_descriptor("Lcom/a/B;->count:I").unwrap();
        assert_eq!(class, "Lcom/a/B;");
        assert_eq!(name, "count");
        assert_eq!(ty, "I");
    }
}
