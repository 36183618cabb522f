/// Converts a temperature from degrees Celsius to degrees Fahrenheit
///
/// ```
/// use temperature_mqtt::units::celsius_to_fahrenheit;
///
/// assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
/// ```
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Converts a temperature from degrees Fahrenheit to degrees Celsius
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_points() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(-40.0), -40.0);
        assert_eq!(celsius_to_fahrenheit(25.0), 77.0);
        assert_eq!(fahrenheit_to_celsius(212.0), 100.0);
    }

    #[test]
    fn test_inverse() {
        let mut celsius = -273.15;
        while celsius < 1000.0 {
            let back = fahrenheit_to_celsius(celsius_to_fahrenheit(celsius));
            assert!(
                (back - celsius).abs() < 1e-9,
                "{celsius} came back as {back}"
            );
            celsius += 0.37;
        }
    }
}
