use regex::Regex;

/// Extrae el id de video si el mensaje completo es un link de YouTube.
///
/// Anclado a principio y fin: un link en medio de una frase no dispara la
/// detección, igual que el mensaje tiene que ser el link y nada más.
pub fn match_watch_link(content: &str) -> Option<String> {
    let re = Regex::new(
        r"^https?://(?:www\.|m\.)?(?:youtube\.com/watch\?v=|youtu\.be/)([\w-]{6,12})(?:[?&][\w=&%-]*)?$",
    )
    .ok()?;
    Some(re.captures(content.trim())?.get(1)?.as_str().to_string())
}
