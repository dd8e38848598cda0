#![allow(unused)]

/// Runs a block and logs how long it took at debug level.
/// The value of the block is returned.
/// ```rs
/// let save = log_time!("save"; store.save());
/// ```
#[macro_export]
macro_rules! log_time {
    ($label:expr; $body:expr) => {
        {
            let now = std::time::Instant::now();
            let result = $body;
            log::debug!("{} took {:?}", $label, now.elapsed());
            result
        }
    };
}

/// The purpose of this macro is to be able to generate code for each
/// primitive integer type (this means no f32 or f64).
/// You invoke the macro with the path to another macro that you would
/// like to invoke for each type.
/// Optionally you can restrict generation to either unsigned or signed
/// by typing `;unsigned` or `;signed` after the provided macro argument.
#[macro_export]
macro_rules! for_each_int_type {
    ($macro:path) => {
        $crate::for_each_int_type!($macro;unsigned);
        $crate::for_each_int_type!($macro;signed);
    };
    ($macro:path;unsigned) => {
        $macro!{u64}
        $macro!{u32}
        $macro!{u16}
        $macro!{u8}
    };
    ($macro:path;signed) => {
        $macro!{i64}
        $macro!{i32}
        $macro!{i16}
        $macro!{i8}
    }
}

/// Return from a function if a condition is met.
/// ```rs
/// // return_if!(condition => expr)
/// fn sample(bounds: IntBox) -> bool {
/// 	return_if!(bounds.is_empty() => false);
/// 	true
/// }
/// ```
#[macro_export]
macro_rules! return_if {
    ($condition:expr $(=> $result:expr)?) => {
        if $condition {
            return $($result)?;
        }
    };
}

#[cfg(test)]
mod tests {
    fn first_positive(values: &[i32]) -> Option<i32> {
        for &value in values {
            return_if!(value > 0 => Some(value));
        }
        None
    }

    #[test]
    fn early_return() {
        assert_eq!(first_positive(&[-1, 0, 3, 4]), Some(3));
        assert_eq!(first_positive(&[-1]), None);
    }

    #[test]
    fn logged_value() {
        let value = log_time!("sum"; (0..10).sum::<i32>());
        assert_eq!(value, 45);
    }
}
