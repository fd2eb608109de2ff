use burn::{
    module::{Module, ModuleDisplay},
    prelude::Backend,
};

pub mod dropout;
pub mod encoder;
pub mod recurrent;
pub mod squeeze;
pub mod strategy;

pub trait ModelConfig {
    type Model<B: Backend>: Module<B> + ModuleDisplay;

    fn init_model<B: Backend>(&self, device: &B::Device) -> Self::Model<B>;
}
