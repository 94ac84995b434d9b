//! Input validation and string sanitization.
//!
//! Everything that crosses from the kernel or /proc into the agent passes
//! through here before it is cached, printed, or exported.

/// Highest PID the kernel will ever hand out (`/proc/sys/kernel/pid_max`
/// upper bound on 64-bit systems).
pub const MAX_PID: u32 = 4_194_304;

/// Longest process name retained after sanitization.
const MAX_PROCESS_NAME_LEN: usize = 64;

/// A PID is valid iff `1 <= pid <= MAX_PID`.
pub fn validate_pid(pid: u32) -> bool {
    pid >= 1 && pid <= MAX_PID
}

/// Sanitize a process name read from the kernel or /proc.
///
/// Names containing `%` are dropped entirely (they cannot be distinguished
/// from format-string injection attempts in downstream sinks). Any
/// non-printable or non-ASCII byte becomes `?`, and the result is truncated
/// to a bounded length. The function is idempotent.
pub fn sanitize_process_name(name: &str) -> String {
    if name.contains('%') {
        return String::new();
    }

    let mut out = String::with_capacity(name.len().min(MAX_PROCESS_NAME_LEN));
    for b in name.bytes() {
        if out.len() >= MAX_PROCESS_NAME_LEN {
            break;
        }
        if (0x20..0x7f).contains(&b) {
            out.push(b as char);
        } else {
            out.push('?');
        }
    }
    out
}

/// Sanitize a field for tabular (CSV) export.
///
/// Escapes embedded quotes and wraps the field in quotes when it contains a
/// quote, comma, or newline. Fields that start with a spreadsheet formula
/// trigger character are prefixed with `'`.
pub fn sanitize_csv_field(field: &str) -> String {
    let mut value = field.to_string();

    if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        value.insert(0, '\'');
    }

    if value.contains('"') || value.contains(',') || value.contains('\n') {
        let escaped = value.replace('"', "\"\"");
        return format!("\"{escaped}\"");
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pid_bounds() {
        assert!(!validate_pid(0));
        assert!(validate_pid(1));
        assert!(validate_pid(MAX_PID));
        assert!(!validate_pid(MAX_PID + 1));
    }

    #[test]
    fn test_sanitize_process_name_plain() {
        assert_eq!(sanitize_process_name("nginx"), "nginx");
        assert_eq!(sanitize_process_name("postgres: writer"), "postgres: writer");
    }

    #[test]
    fn test_sanitize_process_name_rejects_percent() {
        assert_eq!(sanitize_process_name("bad%name"), "");
        assert_eq!(sanitize_process_name("%"), "");
    }

    #[test]
    fn test_sanitize_process_name_replaces_non_printable() {
        assert_eq!(sanitize_process_name("a\x01b"), "a?b");
        assert_eq!(sanitize_process_name("caf\u{e9}"), "caf??");
    }

    #[test]
    fn test_sanitize_process_name_truncates() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_process_name(&long).len(), 64);
    }

    #[test]
    fn test_sanitize_process_name_idempotent() {
        for input in ["nginx", "a\x01b", "caf\u{e9}", &"y".repeat(300)] {
            let once = sanitize_process_name(input);
            let twice = sanitize_process_name(&once);
            assert_eq!(once, twice, "sanitization must be idempotent for {input:?}");
        }
    }

    #[test]
    fn test_sanitize_csv_field_plain() {
        assert_eq!(sanitize_csv_field("plain"), "plain");
        assert_eq!(sanitize_csv_field(""), "");
    }

    #[test]
    fn test_sanitize_csv_field_quoting() {
        assert_eq!(sanitize_csv_field("a,b"), "\"a,b\"");
        assert_eq!(sanitize_csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(sanitize_csv_field("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_sanitize_csv_field_formula_guard() {
        assert_eq!(sanitize_csv_field("=1+2"), "'=1+2");
        assert_eq!(sanitize_csv_field("+SUM(A1)"), "'+SUM(A1)");
        assert_eq!(sanitize_csv_field("-cmd"), "'-cmd");
        assert_eq!(sanitize_csv_field("@cell"), "'@cell");
    }

    #[test]
    fn test_sanitize_csv_field_formula_with_comma() {
        assert_eq!(sanitize_csv_field("=1,2"), "\"'=1,2\"");
    }
}
