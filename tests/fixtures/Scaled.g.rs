// @generated by auto-decorator. Do not edit.
// module: crate::forwarding::shapes
// type: pub struct Scaled

impl Named<u8> for Scaled {
    fn name(&self) -> u8 {
        self.shape.name()
    }
}
