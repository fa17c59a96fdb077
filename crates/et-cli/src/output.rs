//! Console output for the CLI
//!
//! Colored status lines and the table of established tunnels.

use tabled::{settings::Style, Table, Tabled};

use et_core::TunnelDescriptor;

/// Format established tunnels as an ASCII table
///
/// Returns "No tunnels established" for an empty list.
pub fn format_tunnels(tunnels: &[TunnelDescriptor]) -> String {
    if tunnels.is_empty() {
        return "No tunnels established".to_string();
    }

    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "LOCAL")]
        local: String,
        #[tabled(rename = "REMOTE")]
        remote: String,
        #[tabled(rename = "KIND")]
        kind: String,
    }

    let rows: Vec<TunnelRow> = tunnels
        .iter()
        .map(|t| TunnelRow {
            local: format!("127.0.0.1:{}", t.local_port),
            remote: t.remote_endpoint(),
            kind: t.kind.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow to stderr
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use et_core::TunnelKind;

    #[test]
    fn test_format_tunnels_empty() {
        assert_eq!(format_tunnels(&[]), "No tunnels established");
    }

    #[test]
    fn test_format_tunnels() {
        let tunnels = vec![
            TunnelDescriptor {
                local_port: 8080,
                remote_port: 80,
                remote_host: None,
                kind: TunnelKind::Direct,
            },
            TunnelDescriptor {
                local_port: 15432,
                remote_port: 5432,
                remote_host: Some("db.internal".to_string()),
                kind: TunnelKind::Relayed,
            },
        ];

        let table = format_tunnels(&tunnels);
        assert!(table.contains("LOCAL"));
        assert!(table.contains("127.0.0.1:8080"));
        assert!(table.contains("db.internal:5432"));
        assert!(table.contains("relayed"));
    }
}
