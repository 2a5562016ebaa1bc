//! Common Observability Utilities
//!
//! Table formatting shared by the run reports.

fn format_row(list: Vec<String>) -> String {
    format!("| {} |\n", list.join(" | "))
}

/// Calculate column widths based on headers and all row values
fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let num_cols = rows
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0)
        .max(headers.len());

    (0..num_cols)
        .map(|i| {
            let header_width = headers.get(i).map(|h| h.chars().count()).unwrap_or(0);
            let max_row_width = rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0);
            header_width.max(max_row_width)
        })
        .collect()
}

/// Format header row with separator
fn format_headers(headers: &[&str], widths: &[usize], output: &mut String) {
    if headers.is_empty() {
        return;
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    output.push_str(&format_row(header_line));

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&format!("|-{}-|\n", separator.join("-|-")));
}

/// Format data rows
fn format_data_rows(rows: &[Vec<String>], widths: &[usize], output: &mut String) {
    for row in rows {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, width)| {
                let cell = row.get(i).map(String::as_str).unwrap_or("");
                format!("{:width$}", cell, width = width)
            })
            .collect();
        output.push_str(&format_row(cells));
    }
}

/// Format a table with a title, headers, and rows
pub fn format_table_with_title(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut widths = calculate_column_widths(headers, rows);

    // Inner width is the column widths plus " | " between columns
    let total_col_width: usize = widths.iter().sum::<usize>() + (widths.len() - 1) * 3;
    let inner_width = total_col_width.max(title.chars().count());

    // Title wider than the table widens the last column
    if inner_width > total_col_width {
        let extra = inner_width - total_col_width;
        if let Some(last) = widths.last_mut() {
            *last += extra;
        }
    }

    let mut output = String::new();

    output.push_str(&format!(" {} \n", "=".repeat(inner_width + 2)));
    output.push_str(&format!("| {:<inner_width$} |\n", title));
    output.push_str(&format!("|-{}-|\n", "-".repeat(inner_width)));

    format_headers(headers, &widths, &mut output);
    format_data_rows(rows, &widths, &mut output);

    output.push_str(&format!(" {} \n", "-".repeat(inner_width + 2)));

    output
}

/// Format elapsed time as "Xm Ys" or "Ys"
pub fn format_elapsed_secs(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_table_with_title() {
        let table = format_table_with_title(
            "Run",
            &["Metric", "Value"],
            &[vec!["collected".to_string(), "3".to_string()]],
        );
        let lines = table.lines().collect::<Vec<_>>();
        assert_eq!(lines[1], "| Run               |");
        assert_eq!(lines[3], "| Metric    | Value |");
        assert_eq!(lines[5], "| collected | 3     |");
    }

    #[test]
    fn test_wide_title_widens_last_column() {
        let table = format_table_with_title(
            "A much longer title than the table",
            &["K", "V"],
            &[vec!["a".to_string(), "b".to_string()]],
        );
        let widths = table.lines().map(|l| l.chars().count()).collect::<Vec<_>>();
        assert!(widths.iter().all(|w| *w == widths[0]));
    }

    #[test]
    fn test_empty_rows() {
        assert_eq!(format_table_with_title("t", &["a"], &[]), "");
    }

    #[test]
    fn test_format_elapsed_secs() {
        assert_eq!(format_elapsed_secs(42), "42s");
        assert_eq!(format_elapsed_secs(125), "2m 5s");
    }
}
