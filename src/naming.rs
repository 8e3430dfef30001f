/// Produce a display name that does not collide with any taken name
///
/// The base name is used as-is when free; otherwise a numeric suffix is
/// appended, starting at 2 ("Plasma", "Plasma-2", "Plasma-3", ...).
pub fn next_name<'a, I>(base: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = taken.into_iter().collect();

    if !taken.contains(&base) {
        return base.to_string();
    }

    let mut suffix = 2usize;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !taken.iter().any(|name| *name == candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
