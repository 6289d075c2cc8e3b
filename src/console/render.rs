//! Plain-text rendering of cars and menus.

use std::io::{self, Write};

use crate::store::Car;

pub const MENU: &str = "\
cachelens: cars behind a caching HTTP client
    - Press 0 to list all cars
    - Press 1 to create a new car and add it to the repository
    - Press 2 to update the last car (touches its last-modified date)
    - Press 3 to delete the last car
    - Press 4 to get the last car
    - Press x to exit
";

pub const EMPTY_REPOSITORY: &str = "Repo is empty";

const ID: usize = 5;
const PLATE: usize = 11;
const YEAR: usize = 4;
const MODIFIED: usize = 27;

/// Width of a table line, borders included.
const WIDTH: usize = 2 + ID + 3 + PLATE + 3 + YEAR + 3 + MODIFIED + 2;

fn rule(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}", "-".repeat(WIDTH))
}

/// Writes one car as a table row.
pub fn row(out: &mut impl Write, car: &Car) -> io::Result<()> {
    writeln!(
        out,
        "| {:>ID$} | {:<PLATE$} | {:>YEAR$} | {:<MODIFIED$} |",
        car.id,
        car.number_plate,
        car.year,
        car.last_modified.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
    )
}

/// Writes a header row and one row per car between two rule lines.
pub fn table(out: &mut impl Write, cars: &[Car]) -> io::Result<()> {
    rule(out)?;
    writeln!(
        out,
        "| {:>ID$} | {:<PLATE$} | {:>YEAR$} | {:<MODIFIED$} |",
        "Id", "NumberPlate", "Year", "Last Modified"
    )?;
    for car in cars {
        row(out, car)?;
    }
    rule(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn render(cars: &[Car]) -> String {
        let mut out = Vec::new();
        table(&mut out, cars).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn empty_table_keeps_both_rules() {
        let text = render(&[]);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].chars().all(|c| c == '-'));
        assert!(lines[1].contains("NumberPlate"));
        assert_eq!(lines[0], lines[2]);
    }

    #[test]
    fn rows_line_up_with_rules() {
        let at = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let text = render(&[Car::generated(7, at), Car::generated(12_345, at)]);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert_eq!(line.chars().count(), WIDTH, "{line:?}");
        }
        assert!(lines[2].contains("2030-01-02 03:04:05.000 UTC"));
    }
}
