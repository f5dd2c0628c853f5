//! Math typesetting.

/// Optional typesetting facility used by the render pipeline.
pub trait Typesetter: Send + Sync {
    /// `None` leaves the span showing its TeX source.
    fn typeset(&self, source: &str, display: bool) -> Option<String>;
}

/// Typesets a small TeX subset as plain Unicode: Greek letters, common
/// operators and relations, single-character super/subscripts, `\frac` and
/// `\sqrt`. Unknown commands are kept verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeTypesetter;

impl Typesetter for UnicodeTypesetter {
    fn typeset(&self, source: &str, _display: bool) -> Option<String> {
        let out = typeset_group(source.trim());
        (!out.is_empty()).then_some(out)
    }
}

fn symbol(command: &str) -> Option<&'static str> {
    let s = match command {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" => "ε",
        "theta" => "θ",
        "lambda" => "λ",
        "mu" => "μ",
        "pi" => "π",
        "sigma" => "σ",
        "tau" => "τ",
        "phi" => "φ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Omega" => "Ω",
        "times" => "×",
        "cdot" => "·",
        "div" => "÷",
        "pm" => "±",
        "le" | "leq" => "≤",
        "ge" | "geq" => "≥",
        "neq" | "ne" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "infty" => "∞",
        "sum" => "∑",
        "prod" => "∏",
        "int" => "∫",
        "partial" => "∂",
        "nabla" => "∇",
        "to" | "rightarrow" => "→",
        "leftarrow" => "←",
        "Rightarrow" => "⇒",
        "in" => "∈",
        "forall" => "∀",
        "exists" => "∃",
        "ldots" | "dots" => "…",
        "quad" => " ",
        "," | ";" | " " => " ",
        _ => return None,
    };
    Some(s)
}

fn superscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' => '⁻',
        'n' => 'ⁿ',
        'i' => 'ⁱ',
        _ => return None,
    })
}

fn subscript(c: char) -> Option<char> {
    Some(match c {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' => '₋',
        _ => return None,
    })
}

/// Read a `{...}` group or a single character; returns it typeset.
fn take_argument(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    while chars.peek() == Some(&' ') {
        chars.next();
    }
    match chars.next() {
        Some('{') => {
            let mut depth = 1;
            let mut inner = String::new();
            for c in chars.by_ref() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                inner.push(c);
            }
            typeset_group(&inner)
        }
        Some('\\') => {
            let name = take_command(chars);
            symbol(&name)
                .map(str::to_string)
                .unwrap_or_else(|| format!("\\{name}"))
        }
        Some(c) => c.to_string(),
        None => String::new(),
    }
}

fn take_command(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphabetic() {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if name.is_empty() {
        if let Some(c) = chars.next() {
            name.push(c);
        }
    } else if chars.peek() == Some(&' ') {
        // A space only terminates the command name.
        chars.next();
    }
    name
}

fn script(arg: &str, map: fn(char) -> Option<char>, marker: char) -> String {
    match arg.chars().map(map).collect::<Option<String>>() {
        Some(mapped) => mapped,
        None if arg.chars().count() == 1 => format!("{marker}{arg}"),
        None => format!("{marker}({arg})"),
    }
}

fn typeset_group(source: &str) -> String {
    let mut out = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let name = take_command(&mut chars);
                match name.as_str() {
                    "frac" => {
                        let num = take_argument(&mut chars);
                        let den = take_argument(&mut chars);
                        let wrap = |s: String| {
                            if s.chars().count() > 1 {
                                format!("({s})")
                            } else {
                                s
                            }
                        };
                        out.push_str(&format!("{}/{}", wrap(num), wrap(den)));
                    }
                    "sqrt" => {
                        let arg = take_argument(&mut chars);
                        if arg.chars().count() > 1 {
                            out.push_str(&format!("√({arg})"));
                        } else {
                            out.push_str(&format!("√{arg}"));
                        }
                    }
                    "left" | "right" => {}
                    "text" | "mathrm" | "mathbf" | "mathit" => out.push_str(&take_argument(&mut chars)),
                    _ => match symbol(&name) {
                        Some(s) => out.push_str(s),
                        None => {
                            out.push('\\');
                            out.push_str(&name);
                        }
                    },
                }
            }
            '^' => {
                let arg = take_argument(&mut chars);
                out.push_str(&script(&arg, superscript, '^'));
            }
            '_' => {
                let arg = take_argument(&mut chars);
                out.push_str(&script(&arg, subscript, '_'));
            }
            '{' | '}' => {}
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(source: &str) -> String {
        UnicodeTypesetter.typeset(source, false).unwrap()
    }

    #[test]
    fn test_symbols_and_scripts() {
        assert_eq!(ts("\\pi r^2"), "πr²");
        assert_eq!(ts("x_1 + x_2"), "x₁ + x₂");
        assert_eq!(ts("a \\times b \\le c"), "a ×b ≤c");
        assert_eq!(ts("e^{i\\pi} + 1 = 0"), "e^(iπ) + 1 = 0");
        assert_eq!(ts("2^{10}"), "2¹⁰");
    }

    #[test]
    fn test_frac_and_sqrt() {
        assert_eq!(ts("\\frac{1}{2}"), "1/2");
        assert_eq!(ts("\\frac{a+b}{c}"), "(a+b)/c");
        assert_eq!(ts("\\sqrt{x^2 + y^2}"), "√(x² + y²)");
        assert_eq!(ts("\\sqrt 2"), "√2");
    }

    #[test]
    fn test_unknown_commands_are_kept() {
        assert_eq!(ts("\\mathcal{F}"), "\\mathcalF");
        assert_eq!(UnicodeTypesetter.typeset("  ", true), None);
    }
}
