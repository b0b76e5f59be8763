//! Conversión del texto de las respuestas del bot a marcado HTML para el panel.
//!
//! El texto se escapa siempre antes de aplicar el marcado, así que la salida
//! no es idempotente: volver a formatearla escapa de nuevo las etiquetas.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static NUMBERED_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s").expect("regex válida"));
static NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.\s*").expect("regex válida"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("regex válida"));
static FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```([\w+-]*)\n?(.*?)```").expect("regex válida"));
static INLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("regex válida"));

pub fn format(text: &str) -> String {
    let escaped = escape_html(text);
    let bolded = BOLD.replace_all(&escaped, "<strong>$1</strong>");
    let fenced = FENCED.replace_all(&bolded, |caps: &Captures| {
        let class = match &caps[1] {
            "" => String::new(),
            lang => format!(" class=\"language-{lang}\""),
        };
        format!(
            "<div class=\"code-block\"><button class=\"copy-button\">Copiar</button>\
             <pre><code{}>{}</code></pre></div>",
            class,
            caps[2].trim()
        )
    });
    let inline = INLINE.replace_all(&fenced, "<code>$1</code>");

    let listed = if NUMBERED_START.is_match(&inline) {
        let items: String = inline
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| format!("<li>{}</li>", NUMBER_PREFIX.replace(line, "")))
            .collect();
        format!("<ol>{items}</ol>")
    } else {
        inline.into_owned()
    };

    listed.replace('\n', "<br>")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stays_empty() {
        assert_eq!(format(""), "");
    }

    #[test]
    fn escapes_before_markup() {
        assert_eq!(format("<b>hola</b> & **adiós**"), "&lt;b&gt;hola&lt;/b&gt; &amp; <strong>adiós</strong>");
    }

    #[test]
    fn fenced_block_gets_copy_button() {
        let out = format("Mira:\n```rust\nfn main() {}\n```\nfin");
        assert_eq!(
            out,
            "Mira:<br><div class=\"code-block\"><button class=\"copy-button\">Copiar</button>\
             <pre><code class=\"language-rust\">fn main() {}</code></pre></div><br>fin"
        );
    }

    #[test]
    fn inline_code_and_line_breaks() {
        assert_eq!(format("usa `cargo`\ny ya"), "usa <code>cargo</code><br>y ya");
    }

    #[test]
    fn numbered_list_only_at_message_start() {
        assert_eq!(
            format("1. uno\n2. **dos**\n\n3. tres"),
            "<ol><li>uno</li><li><strong>dos</strong></li><li>tres</li></ol>"
        );
        assert_eq!(format("Pasos:\n1. uno\n2. dos"), "Pasos:<br>1. uno<br>2. dos");
    }

    #[test]
    fn formatting_twice_escapes_again() {
        let once = format("**a**");
        assert_eq!(once, "<strong>a</strong>");
        assert_eq!(format(&once), "&lt;strong&gt;a&lt;/strong&gt;");
    }
}
