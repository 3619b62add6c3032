// ZipSig Rust - Signed and optionally encrypted ZIP bundles
// Copyright (C) 2026 Tiash H Kabir / @MrCarb0n
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use zipsig::cli::{self, Outcome};
use zipsig::ui::Ui;

fn main() {
    match cli::run() {
        Ok(Outcome::Done) => {}
        Ok(Outcome::Rejected) => std::process::exit(2),
        Err(e) => {
            Ui::default().error(&format!("{}", e));
            std::process::exit(1);
        }
    }
}
