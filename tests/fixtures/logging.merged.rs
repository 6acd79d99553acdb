use auto_decorator::decorator;

pub trait Logger {
    fn information(&self, message: &str);
    fn error(&self, message: &str);
}

#[decorator]
pub struct MaskLogger {
    pub original: Box<dyn Logger>,
}

impl Logger for MaskLogger {
    fn error(&self, message: &str) {
        let masked = message.replace(|c: char| c.is_ascii_digit(), "*");
        self.original.error(&masked);
    }

    fn information(&self, message: &str) {
        self.original.information(message);
    }
}
