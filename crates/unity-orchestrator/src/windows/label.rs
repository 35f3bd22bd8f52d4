const LABEL_PREFIX: &str = "task-";
const DIGEST_CHARS: usize = 8;

/// Window label for a task: `task-` plus the lowercase slug of its name.
///
/// When the slug is not the name itself, a short blake3 digest of the raw name is
/// appended, so two names that slug alike still get distinct labels.
pub fn label_for(task_name: &str) -> String {
    let slug = slugify(task_name);
    if slug == task_name {
        return format!("{}{}", LABEL_PREFIX, slug);
    }

    let digest = blake3::hash(task_name.as_bytes()).to_hex();
    format!("{}{}-{}", LABEL_PREFIX, slug, &digest.as_str()[..DIGEST_CHARS])
}

fn slugify(task_name: &str) -> String {
    let mut slug = String::with_capacity(task_name.len());
    let mut pending_dash = false;

    for c in task_name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        slug.push_str("unnamed");
    }
    slug
}
