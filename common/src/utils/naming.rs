//! Deterministic, DNS-1123 compatible names for scan jobs.

const MAX_NAME_LEN: usize = 63;
const DIGEST_CHARS: usize = 12;
const SHORT_DIGEST_CHARS: usize = 8;

/// `<service>-port-<port>`
///
/// A name too long to fit is cut and tagged with a hash of the full name, so services sharing
/// a long prefix still get distinct jobs.
pub fn service_job_name(service: &str, port: u16) -> String {
    let suffix: String = format!("-port-{port}");
    let base: String = sanitize(service);
    let budget: usize = MAX_NAME_LEN - suffix.len();
    if base.len() <= budget {
        return format!("{base}{suffix}");
    }
    let digest: String = blake3::hash(service.as_bytes()).to_hex().to_string();
    let tag: &str = &digest[..SHORT_DIGEST_CHARS];
    let head: &str = truncate(&base, budget - tag.len() - 1);
    format!("{head}-{tag}{suffix}")
}

/// `scan-<image short name>-at-<hash>`
///
/// The hash is taken over the full image id so two digests of the same image never collide.
pub fn container_job_name(image: &str, image_id: &str) -> String {
    let digest: String = blake3::hash(image_id.as_bytes()).to_hex().to_string();
    let suffix: String = format!("-at-{}", &digest[..DIGEST_CHARS]);
    let short: String = sanitize(image_short_name(image));
    let budget: usize = MAX_NAME_LEN - suffix.len() - "scan-".len();
    format!("scan-{}{}", truncate(&short, budget), suffix)
}

/// `registry.io/team/app:1.2@sha256:...` -> `app`
fn image_short_name(image: &str) -> &str {
    let without_digest: &str = image.split('@').next().unwrap_or(image);
    let last_segment: &str = without_digest.rsplit('/').next().unwrap_or(without_digest);
    last_segment.split(':').next().unwrap_or(last_segment)
}

/// Lowercases and replaces everything outside `[a-z0-9-]` with `-`.
pub fn sanitize(raw: &str) -> String {
    let mut out: String = String::with_capacity(raw.len());
    let mut last_dash: bool = true;
    for c in raw.chars() {
        let c: char = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed: &str = out.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

fn truncate(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    name[..max].trim_end_matches('-')
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
