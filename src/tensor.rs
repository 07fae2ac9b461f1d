//! Named parameter tensor with an optional gradient buffer

use ndarray::{Array1, ArrayView2, ArrayViewMut2};

/// Flat `f32` buffer with a logical shape and an optional gradient
///
/// Parameters are stored flattened; [`Tensor::view2`] gives a matrix view for
/// rank-2 parameters such as a linear layer's weight.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    name: String,
    shape: Vec<usize>,
    data: Array1<f32>,
    grad: Option<Array1<f32>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a tensor from flat data and a shape
    ///
    /// # Panics
    ///
    /// Panics if the shape's element count does not match `data.len()`.
    pub fn new(
        name: impl Into<String>,
        shape: Vec<usize>,
        data: Array1<f32>,
        requires_grad: bool,
    ) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            numel,
            data.len(),
            "Tensor shape {:?} does not match data length {}",
            shape,
            data.len()
        );
        Self {
            name: name.into(),
            shape,
            data,
            grad: None,
            requires_grad,
        }
    }

    /// Create a rank-1 tensor from a vector
    pub fn from_vec(name: impl Into<String>, data: Vec<f32>, requires_grad: bool) -> Self {
        let len = data.len();
        Self::new(name, vec![len], Array1::from(data), requires_grad)
    }

    /// Create a tensor filled with zeros
    pub fn zeros(name: impl Into<String>, shape: Vec<usize>, requires_grad: bool) -> Self {
        let numel: usize = shape.iter().product();
        Self::new(name, shape, Array1::zeros(numel), requires_grad)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get reference to data
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Get mutable reference to data
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Matrix view of a rank-2 tensor
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not rank 2.
    pub fn view2(&self) -> ArrayView2<'_, f32> {
        let (rows, cols) = self.dims2();
        ArrayView2::from_shape((rows, cols), self.data.as_slice().expect("contiguous data"))
            .expect("shape checked at construction")
    }

    /// Mutable matrix view of a rank-2 tensor
    pub fn view2_mut(&mut self) -> ArrayViewMut2<'_, f32> {
        let (rows, cols) = self.dims2();
        ArrayViewMut2::from_shape(
            (rows, cols),
            self.data.as_slice_mut().expect("contiguous data"),
        )
        .expect("shape checked at construction")
    }

    fn dims2(&self) -> (usize, usize) {
        assert_eq!(
            self.shape.len(),
            2,
            "Tensor {} has shape {:?}, expected rank 2",
            self.name,
            self.shape
        );
        (self.shape[0], self.shape[1])
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<&Array1<f32>> {
        self.grad.as_ref()
    }

    /// Set gradient
    pub fn set_grad(&mut self, grad: Array1<f32>) {
        debug_assert_eq!(grad.len(), self.data.len());
        self.grad = Some(grad);
    }

    /// Accumulate gradient (for when a tensor receives several contributions)
    pub fn accumulate_grad(&mut self, grad: Array1<f32>) {
        match self.grad.as_mut() {
            Some(existing) => *existing += &grad,
            None => self.grad = Some(grad),
        }
    }

    /// Zero out gradient
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Check if requires gradient
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Squared L2 norm of the gradient, zero when there is none
    pub fn grad_norm_sq(&self) -> f32 {
        self.grad
            .as_ref()
            .map(|g| g.iter().map(|&v| v * v).sum())
            .unwrap_or(0.0)
    }

    /// Get size
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("has_grad", &self.grad.is_some())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}
