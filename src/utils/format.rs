/// Render an amount in minor units as a major-unit decimal string, e.g. `-4250` as `-42.50`.
pub fn format_minor_units(amount: i64) -> String {
	let sign = if amount < 0 { "-" } else { "" };
	let magnitude = amount.unsigned_abs();
	format!("{}{}.{:02}", sign, magnitude / 100, magnitude % 100)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_cents() {
		assert_eq!(format_minor_units(-4250), "-42.50");
		assert_eq!(format_minor_units(7), "0.07");
		assert_eq!(format_minor_units(-7), "-0.07");
		assert_eq!(format_minor_units(0), "0.00");
		assert_eq!(format_minor_units(i64::MIN), "-92233720368547758.08");
	}
}
