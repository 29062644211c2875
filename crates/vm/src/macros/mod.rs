#[macro_export]
macro_rules! generate_bin_op_methods {
    ($($name:ident => $variant:ident),*) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> &mut Self {
                self.add_instruction(Instruction::Binary(BinaryOperation::$variant))
            }
        )*
    };
}

#[macro_export]
macro_rules! generate_unary_op_methods {
    ($($name:ident => $variant:ident),*) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> &mut Self {
                self.add_instruction(Instruction::Unary(UnaryOperation::$variant))
            }
        )*
    };
}

/// Builder methods for instructions without operands.
#[macro_export]
macro_rules! generate_simple_instruction_methods {
    ($($name:ident => $variant:ident),*) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> &mut Self {
                self.add_instruction(Instruction::$variant)
            }
        )*
    };
}
