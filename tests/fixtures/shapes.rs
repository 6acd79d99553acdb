use auto_decorator::decorator;

pub trait Named<T> {
    fn name(&self) -> T;
}

pub trait Shape: Named<u8> {
    fn area(&self) -> f64;
}

#[decorator]
pub struct Scaled {
    pub shape: Box<dyn Shape>,
    pub factor: f64,
}

impl Shape for Scaled {
    fn area(&self) -> f64 {
        self.shape.area() * self.factor * self.factor
    }
}
