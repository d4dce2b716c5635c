/*!
 * The `rsync.watch-scope-eval` external command.
 *
 * An optional shell command that, each time it is run, prints one directory prefix per line —
 * the set of subtrees the watcher should currently care about. A single line of `/` (or no
 * output at all) means "watch everything". The watcher calls this once at startup and again
 * every time a new directory is created, since the scope is allowed to change while the daemon
 * is running (e.g. a sibling process updating a manifest of what's in scope).
 */

use std::process::Command;

use tracing::warn;

/// `None` means "watch everything"; `Some(prefixes)` narrows the watch to those subtrees.
pub type Includes = Option<Vec<String>>;

/// Run `command` and parse its stdout per the include-eval contract.
///
/// Returns `None` if the command could not be spawned or exited non-zero — the caller should
/// keep whatever include set was already in effect rather than treat a failed eval as "watch
/// everything" (a transient failure of the scope helper shouldn't suddenly widen the watch to
/// the entire tree).
pub fn evaluate(command: &str) -> Option<Includes> {
    let output = match Command::new("sh").arg("-c").arg(command).output() {
        Ok(output) => output,
        Err(e) => {
            warn!(command, error = %e, "failed to spawn watch-scope-eval command");
            return None;
        }
    };

    if !output.stderr.is_empty() {
        warn!(
            command,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "watch-scope-eval wrote to stderr"
        );
    }

    if !output.status.success() {
        warn!(command, status = %output.status, "watch-scope-eval exited non-zero");
        return None;
    }

    Some(parse(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse include-eval stdout into an include list, applying the contract's normalization:
/// lines are trimmed, a bare `/` (or no lines at all) means "watch everything", and surviving
/// lines have their leading `/` stripped and a trailing `/` appended if missing.
fn parse(stdout: &str) -> Includes {
    let lines: Vec<&str> = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    if lines.is_empty() || lines.iter().any(|&l| l == "/") {
        return None;
    }

    Some(
        lines
            .into_iter()
            .map(|l| {
                let stripped = l.trim_start_matches('/');
                if stripped.is_empty() || stripped.ends_with('/') {
                    stripped.to_string()
                } else {
                    format!("{stripped}/")
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_means_watch_everything() {
        assert_eq!(parse(""), None);
    }

    #[test]
    fn bare_slash_means_watch_everything() {
        assert_eq!(parse("/\n"), None);
    }

    #[test]
    fn lines_are_trimmed_and_normalized() {
        assert_eq!(
            parse("  /a/b  \nc/d/\n"),
            Some(vec!["a/b/".to_string(), "c/d/".to_string()])
        );
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(parse("a/b\n\n\nc/d\n"), Some(vec!["a/b/".to_string(), "c/d/".to_string()]));
    }

    #[test]
    fn evaluate_reports_failure_to_spawn_as_none() {
        // A command containing a null byte can never be handed to `sh -c` successfully, so
        // `Command::output` fails before `sh` even runs.
        assert_eq!(evaluate("\0"), None);
    }

    #[test]
    fn evaluate_runs_real_command_and_parses_output() {
        let result = evaluate("printf 'a/b\\nc/d\\n'");
        assert_eq!(result, Some(Some(vec!["a/b/".to_string(), "c/d/".to_string()])));
    }

    #[test]
    fn evaluate_treats_nonzero_exit_as_failure() {
        let result = evaluate("exit 1");
        assert_eq!(result, None);
    }
}
