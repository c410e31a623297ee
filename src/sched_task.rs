//! Device-resident CPU-kernel task arg blocks — the scheduler primitives
//! `CpuSchedModelBuilder` and `NpuSchedModelLoader` assemble onto a stream.
//!
//! Every task follows the same two-phase build: serialize a `#[repr(C)]`
//! header (plus any inline arrays) into one contiguous blob, `rtMalloc` it
//! onto the device, then — for tasks whose header carries pointers into its
//! own inline arrays — patch those fields with the now-known device base
//! address and re-upload the corrected bytes. `distribute` launches the
//! kernel passing the arg block's device address as the (pointer-sized)
//! launch payload; the launch call itself only needs to know where the real
//! argument struct lives on-device, not to receive it inline.

use std::mem::size_of;

use gehete_drv_core::{self as core, Stream};

use crate::error::Result;

/// A device-resident, self-freeing argument block for one scheduler task.
pub struct DeviceArgBlock {
    addr: *mut u8,
    len: usize,
}

unsafe impl Send for DeviceArgBlock {}

impl DeviceArgBlock {
    fn upload(bytes: &[u8]) -> Result<DeviceArgBlock> {
        let addr = core::malloc_device(bytes.len().max(1))?;
        core::memcpy_h2d(addr, bytes.len(), bytes)?;
        Ok(DeviceArgBlock { addr, len: bytes.len() })
    }

    fn rewrite(&self, bytes: &[u8]) -> Result<()> {
        core::memcpy_h2d(self.addr, self.len, bytes)
    }

    pub fn device_addr(&self) -> u64 {
        self.addr as u64
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Drop for DeviceArgBlock {
    fn drop(&mut self) {
        let _ = core::free_device(self.addr);
    }
}

fn bytes_of<T: Copy>(val: &T) -> &[u8] {
    unsafe { std::slice::from_raw_parts(val as *const T as *const u8, size_of::<T>()) }
}

/// Common surface over every scheduler task kind.
pub trait SchedTaskInfo {
    fn kernel_name(&self) -> &'static str;
    fn task_id(&self) -> u64;
    fn arg_block(&self) -> &DeviceArgBlock;

    /// Launches the kernel on `stream`, passing the arg block's device
    /// address as the kernel's pointer-sized argument payload.
    fn distribute(&self, stream: Stream) -> Result<()> {
        if cfg!(feature = "kernel_debug_print") {
            println!("-> Launching '{}' (task_id: {}).", self.kernel_name(), self.task_id());
        }
        let addr = self.arg_block().device_addr().to_le_bytes();
        core::cpu_kernel_launch(self.kernel_name(), &addr, stream)
    }
}

macro_rules! fixed_arg_task {
    ($wrapper:ident, $kernel:expr, $header:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[repr(C)]
        #[derive(Clone, Copy)]
        struct $header { $($field: $ty),* }

        pub struct $wrapper {
            task_id: u64,
            block: DeviceArgBlock,
        }

        impl $wrapper {
            pub fn new(task_id: u64, $($field: $ty),*) -> Result<$wrapper> {
                let header = $header { $($field),* };
                let block = DeviceArgBlock::upload(bytes_of(&header))?;
                Ok($wrapper { task_id, block })
            }
        }

        impl SchedTaskInfo for $wrapper {
            fn kernel_name(&self) -> &'static str { $kernel }
            fn task_id(&self) -> u64 { self.task_id }
            fn arg_block(&self) -> &DeviceArgBlock { &self.block }
        }
    };
}

// -- single-queue 1:1 handoff --------------------------------------------

fixed_arg_task!(SchedTaskModelEnqueue, "modelEnqueue", ModelEnqueueHeader {
    queue_id: u32,
    mbuf_addr: u64,
});

fixed_arg_task!(SchedTaskModelDequeue, "modelDequeue", ModelDequeueHeader {
    queue_id: u32,
    mbuf_addr: u64,
});

fixed_arg_task!(SchedTaskModelEnqueueBuff, "modelEnqueueBuff", ModelEnqueueBuffHeader {
    queue_id: u32,
    device_id: i32,
    mbuf_addr: u64,
});

// -- model lifecycle on the scheduler stream ------------------------------

fixed_arg_task!(SchedTaskActiveModel, "activeModel", ActiveModelHeader {
    model_id: u32,
});

fixed_arg_task!(SchedTaskModelWaitEndGraph, "modelWaitEndGraph", ModelWaitEndGraphHeader {
    model_id: u32,
});

fixed_arg_task!(SchedTaskModelRepeat, "modelRepeat", ModelRepeatHeader {
    model_id: u32,
});

/// Shape shared by the `streamRepeat` task and the supplementary
/// `StreamRepeatKernelArgs` arg block the source defines separately; the
/// device ABI is the same struct either way.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StreamRepeatKernelArgs {
    pub model_id: u32,
    pub stream_id: u32,
}

pub struct SchedTaskStreamRepeat {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskStreamRepeat {
    pub fn new(task_id: u64, model_id: u32, stream_id: u32) -> Result<SchedTaskStreamRepeat> {
        let args = StreamRepeatKernelArgs { model_id, stream_id };
        let block = DeviceArgBlock::upload(bytes_of(&args))?;
        Ok(SchedTaskStreamRepeat { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskStreamRepeat {
    fn kernel_name(&self) -> &'static str { "streamRepeat" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

// -- cross-stream notify ---------------------------------------------------

/// Shape shared by `waitNotify`/`recordNotify`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AicpuNotifyKernelArgs {
    pub notify_id: u32,
    pub ret_code: i32,
}

pub struct SchedTaskNotifyWait {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskNotifyWait {
    pub fn new(task_id: u64, notify_id: u32) -> Result<SchedTaskNotifyWait> {
        let args = AicpuNotifyKernelArgs { notify_id, ret_code: 0 };
        let block = DeviceArgBlock::upload(bytes_of(&args))?;
        Ok(SchedTaskNotifyWait { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskNotifyWait {
    fn kernel_name(&self) -> &'static str { "waitNotify" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

pub struct SchedTaskNotifyRecord {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskNotifyRecord {
    pub fn new(task_id: u64, notify_id: u32, ret_code: i32) -> Result<SchedTaskNotifyRecord> {
        let args = AicpuNotifyKernelArgs { notify_id, ret_code };
        let block = DeviceArgBlock::upload(bytes_of(&args))?;
        Ok(SchedTaskNotifyRecord { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskNotifyRecord {
    fn kernel_name(&self) -> &'static str { "recordNotify" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

// -- batch / gather dequeue -------------------------------------------------

/// Header for `modelBatchDequeue`: one local queue per input, optionally
/// offset by a per-input alignment window. `queue_ids`/`align_offsets` and
/// `mbuf_addrs` (filled by the kernel on return) are inline arrays
/// immediately following the header inside the same arg block; the header's
/// pointer fields are self-referential device addresses into that block.
#[repr(C)]
#[derive(Clone, Copy)]
struct ModelBatchDequeueHeader {
    num_inputs: u32,
    align_interval: u32,
    align_offsets_ptr: u64,
    queue_ids_ptr: u64,
    mbuf_addrs_ptr: u64,
}

pub struct SchedTaskModelBatchDequeue {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskModelBatchDequeue {
    pub fn new(task_id: u64, align_interval: u32, align_offsets: &[i32], queue_ids: &[u32]) -> Result<SchedTaskModelBatchDequeue> {
        assert_eq!(align_offsets.len(), queue_ids.len());
        let num_inputs = queue_ids.len() as u32;
        let header_len = size_of::<ModelBatchDequeueHeader>();
        let offsets_off = header_len;
        let offsets_len = align_offsets.len() * size_of::<i32>();
        let queue_ids_off = offsets_off + offsets_len;
        let queue_ids_len = queue_ids.len() * size_of::<u32>();
        let mbuf_addrs_off = queue_ids_off + queue_ids_len;
        let mbuf_addrs_len = queue_ids.len() * size_of::<u64>();
        let total = mbuf_addrs_off + mbuf_addrs_len;

        let mut bytes = vec![0u8; total];
        let header = ModelBatchDequeueHeader { num_inputs, align_interval, align_offsets_ptr: 0, queue_ids_ptr: 0, mbuf_addrs_ptr: 0 };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        for (i, v) in align_offsets.iter().enumerate() {
            bytes[offsets_off + i * 4..offsets_off + i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        for (i, v) in queue_ids.iter().enumerate() {
            bytes[queue_ids_off + i * 4..queue_ids_off + i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let patched = ModelBatchDequeueHeader {
            num_inputs, align_interval,
            align_offsets_ptr: base + offsets_off as u64,
            queue_ids_ptr: base + queue_ids_off as u64,
            mbuf_addrs_ptr: base + mbuf_addrs_off as u64,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&patched));
        block.rewrite(&bytes)?;

        Ok(SchedTaskModelBatchDequeue { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskModelBatchDequeue {
    fn kernel_name(&self) -> &'static str { "modelBatchDequeue" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

/// Client-queue counterpart of [`SchedTaskModelBatchDequeue`], adding a
/// `device_ids` inline array alongside `queue_ids`.
#[repr(C)]
#[derive(Clone, Copy)]
struct ModelBatchDequeueBuffHeader {
    num_inputs: u32,
    align_interval: u32,
    align_offsets_ptr: u64,
    queue_ids_ptr: u64,
    device_ids_ptr: u64,
    mbuf_addrs_ptr: u64,
}

/// Supplementary arg-block shape the batch/gather dequeue family shares for
/// describing one queue's identity on the device side.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct QueueInfoKernelArgs {
    pub queue_id: u32,
    pub device_id: i32,
}

/// Aggregate form of [`QueueInfoKernelArgs`] used by the batch enqueue/
/// dequeue kernels to describe all of their queues in one inline array.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct BatchQueueInfoKernelArgs {
    pub num_queues: u32,
    pub queues_ptr: u64,
}

pub struct SchedTaskModelBatchDequeueBuff {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskModelBatchDequeueBuff {
    pub fn new(task_id: u64, align_interval: u32, align_offsets: &[i32], queues: &[QueueInfoKernelArgs]) -> Result<SchedTaskModelBatchDequeueBuff> {
        assert_eq!(align_offsets.len(), queues.len());
        let num_inputs = queues.len() as u32;
        let header_len = size_of::<ModelBatchDequeueBuffHeader>();
        let offsets_off = header_len;
        let offsets_len = align_offsets.len() * size_of::<i32>();
        let queue_ids_off = offsets_off + offsets_len;
        let queue_ids_len = queues.len() * size_of::<u32>();
        let device_ids_off = queue_ids_off + queue_ids_len;
        let device_ids_len = queues.len() * size_of::<i32>();
        let mbuf_addrs_off = device_ids_off + device_ids_len;
        let mbuf_addrs_len = queues.len() * size_of::<u64>();
        let total = mbuf_addrs_off + mbuf_addrs_len;

        let mut bytes = vec![0u8; total];
        for (i, v) in align_offsets.iter().enumerate() {
            bytes[offsets_off + i * 4..offsets_off + i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        for (i, q) in queues.iter().enumerate() {
            bytes[queue_ids_off + i * 4..queue_ids_off + i * 4 + 4].copy_from_slice(&q.queue_id.to_le_bytes());
            bytes[device_ids_off + i * 4..device_ids_off + i * 4 + 4].copy_from_slice(&q.device_id.to_le_bytes());
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = ModelBatchDequeueBuffHeader {
            num_inputs, align_interval,
            align_offsets_ptr: base + offsets_off as u64,
            queue_ids_ptr: base + queue_ids_off as u64,
            device_ids_ptr: base + device_ids_off as u64,
            mbuf_addrs_ptr: base + mbuf_addrs_off as u64,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskModelBatchDequeueBuff { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskModelBatchDequeueBuff {
    fn kernel_name(&self) -> &'static str { "modelBatchDequeueBuff" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

/// Cross-device/cross-type alignment fan-in.
#[repr(C)]
#[derive(Clone, Copy)]
struct GatherDequeueHeader {
    input_nums: u32,
    align_timeout_ms: u32,
    max_cache_num: u32,
    drop_when_not_align: u32,
    queue_ids_ptr: u64,
    mbuf_addrs_ptr: u64,
    device_ids_ptr: u64,
    device_types_ptr: u64,
}

pub struct SchedTaskGatherDequeue {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskGatherDequeue {
    pub fn new(task_id: u64, align_timeout_ms: u32, max_cache_num: u32, drop_when_not_align: bool,
            queues: &[QueueInfoKernelArgs], device_types: &[u32]) -> Result<SchedTaskGatherDequeue> {
        assert_eq!(queues.len(), device_types.len());
        let input_nums = queues.len() as u32;
        let header_len = size_of::<GatherDequeueHeader>();
        let queue_ids_off = header_len;
        let queue_ids_len = queues.len() * 4;
        let mbuf_addrs_off = queue_ids_off + queue_ids_len;
        let mbuf_addrs_len = queues.len() * 8;
        let device_ids_off = mbuf_addrs_off + mbuf_addrs_len;
        let device_ids_len = queues.len() * 4;
        let device_types_off = device_ids_off + device_ids_len;
        let device_types_len = device_types.len() * 4;
        let total = device_types_off + device_types_len;

        let mut bytes = vec![0u8; total];
        for (i, q) in queues.iter().enumerate() {
            bytes[queue_ids_off + i * 4..queue_ids_off + i * 4 + 4].copy_from_slice(&q.queue_id.to_le_bytes());
            bytes[device_ids_off + i * 4..device_ids_off + i * 4 + 4].copy_from_slice(&q.device_id.to_le_bytes());
        }
        for (i, t) in device_types.iter().enumerate() {
            bytes[device_types_off + i * 4..device_types_off + i * 4 + 4].copy_from_slice(&t.to_le_bytes());
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = GatherDequeueHeader {
            input_nums, align_timeout_ms, max_cache_num,
            drop_when_not_align: drop_when_not_align as u32,
            queue_ids_ptr: base + queue_ids_off as u64,
            mbuf_addrs_ptr: base + mbuf_addrs_off as u64,
            device_ids_ptr: base + device_ids_off as u64,
            device_types_ptr: base + device_types_off as u64,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskGatherDequeue { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskGatherDequeue {
    fn kernel_name(&self) -> &'static str { "gatherDequeue" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

pub struct SchedTaskModelBatchEnqueue {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskModelBatchEnqueue {
    pub fn new(task_id: u64, queues: &[QueueInfoKernelArgs]) -> Result<SchedTaskModelBatchEnqueue> {
        let header_len = size_of::<BatchQueueInfoKernelArgs>();
        let queues_off = header_len;
        let queues_len = queues.len() * size_of::<QueueInfoKernelArgs>();
        let total = queues_off + queues_len;

        let mut bytes = vec![0u8; total];
        for (i, q) in queues.iter().enumerate() {
            let off = queues_off + i * size_of::<QueueInfoKernelArgs>();
            bytes[off..off + size_of::<QueueInfoKernelArgs>()].copy_from_slice(bytes_of(q));
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = BatchQueueInfoKernelArgs { num_queues: queues.len() as u32, queues_ptr: base + queues_off as u64 };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskModelBatchEnqueue { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskModelBatchEnqueue {
    fn kernel_name(&self) -> &'static str { "modelBatchEnqueue" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

// -- input/output marshaling -------------------------------------------------

/// `prepareDynamicInputOutput`: marshals per-input `RuntimeTensorDesc`s into
/// the request Mbuf and allocates output Mbufs sized by `output_tensor_sizes`.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct PrepareDynamicInputOutputHeader {
    num_inputs: u32,
    num_outputs: u32,
    input_sizes_ptr: u64,
    output_sizes_ptr: u64,
    req_mbuf_addr_ptr: u64,
}

pub struct SchedTaskPrepareDynamicInputOutput {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskPrepareDynamicInputOutput {
    pub fn new(task_id: u64, input_sizes: &[u64], output_sizes: &[u64]) -> Result<SchedTaskPrepareDynamicInputOutput> {
        let header_len = size_of::<PrepareDynamicInputOutputHeader>();
        let input_sizes_off = header_len;
        let input_sizes_len = input_sizes.len() * 8;
        let output_sizes_off = input_sizes_off + input_sizes_len;
        let output_sizes_len = output_sizes.len() * 8;
        let req_mbuf_addr_off = output_sizes_off + output_sizes_len;
        let total = req_mbuf_addr_off + 8;

        let mut bytes = vec![0u8; total];
        for (i, v) in input_sizes.iter().enumerate() {
            bytes[input_sizes_off + i * 8..input_sizes_off + i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }
        for (i, v) in output_sizes.iter().enumerate() {
            bytes[output_sizes_off + i * 8..output_sizes_off + i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = PrepareDynamicInputOutputHeader {
            num_inputs: input_sizes.len() as u32,
            num_outputs: output_sizes.len() as u32,
            input_sizes_ptr: base + input_sizes_off as u64,
            output_sizes_ptr: base + output_sizes_off as u64,
            req_mbuf_addr_ptr: base + req_mbuf_addr_off as u64,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskPrepareDynamicInputOutput { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskPrepareDynamicInputOutput {
    fn kernel_name(&self) -> &'static str { "prepareDynamicInputOutput" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

/// `prepareDynamicInputOutputV2`: same shape, but `output_sizes` is
/// unbounded (no static per-output max) since the device scheduler supports
/// querying the real size at dispatch time. The arg block is identical; only
/// the kernel name differs, matching the device ABI's actual shape.
pub struct SchedTaskPrepareDynamicInputOutputV2 {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskPrepareDynamicInputOutputV2 {
    pub fn new(task_id: u64, input_sizes: &[u64]) -> Result<SchedTaskPrepareDynamicInputOutputV2> {
        let inner = SchedTaskPrepareDynamicInputOutput::new(task_id, input_sizes, &[])?;
        Ok(SchedTaskPrepareDynamicInputOutputV2 { task_id: inner.task_id, block: inner.block })
    }
}

impl SchedTaskInfo for SchedTaskPrepareDynamicInputOutputV2 {
    fn kernel_name(&self) -> &'static str { "prepareDynamicInputOutputV2" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

/// `postprocessDynamicOutput[V2]`: copies output `RuntimeTensorDesc`s from
/// the response Mbuf into per-output Mbufs, then frees the request Mbuf.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct PostprocessDynamicOutputHeader {
    num_inputs: u32,
    num_outputs: u32,
    output_mbuf_addrs_ptr: u64,
}

pub struct SchedTaskPostprocessDynamicOutput {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskPostprocessDynamicOutput {
    pub fn new(task_id: u64, num_inputs: u32, output_mbuf_addrs: &[u64]) -> Result<SchedTaskPostprocessDynamicOutput> {
        let header_len = size_of::<PostprocessDynamicOutputHeader>();
        let addrs_off = header_len;
        let addrs_len = output_mbuf_addrs.len() * 8;
        let total = addrs_off + addrs_len;

        let mut bytes = vec![0u8; total];
        for (i, v) in output_mbuf_addrs.iter().enumerate() {
            bytes[addrs_off + i * 8..addrs_off + i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = PostprocessDynamicOutputHeader {
            num_inputs, num_outputs: output_mbuf_addrs.len() as u32,
            output_mbuf_addrs_ptr: base + addrs_off as u64,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskPostprocessDynamicOutput { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskPostprocessDynamicOutput {
    fn kernel_name(&self) -> &'static str { "postprocessDynamicOutput" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

pub struct SchedTaskPostprocessDynamicOutputV2 {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskPostprocessDynamicOutputV2 {
    pub fn new(task_id: u64, num_inputs: u32, output_mbuf_addrs: &[u64]) -> Result<SchedTaskPostprocessDynamicOutputV2> {
        let inner = SchedTaskPostprocessDynamicOutput::new(task_id, num_inputs, output_mbuf_addrs)?;
        Ok(SchedTaskPostprocessDynamicOutputV2 { task_id: inner.task_id, block: inner.block })
    }
}

impl SchedTaskInfo for SchedTaskPostprocessDynamicOutputV2 {
    fn kernel_name(&self) -> &'static str { "postprocessDynamicOutputV2" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

// -- step bookkeeping -------------------------------------------------------

/// `markStep`: increments the global step counter, propagates the dump-step
/// string and group-replica policy.
#[repr(C)]
struct MarkStepHeader {
    group_total_count: u32,
    group_index: u32,
    group_policy: u32,
    is_head: u32,
    global_step_addr: u64,
    dump_step_ptr: u64,
    dump_step_len: u32,
}

pub struct SchedTaskMarkStep {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskMarkStep {
    pub fn new(task_id: u64, group_total_count: u32, group_index: u32, group_policy: u32,
            dump_step: &str, global_step_addr: u64, is_head: bool) -> Result<SchedTaskMarkStep> {
        let header_len = size_of::<MarkStepHeader>();
        let dump_step_bytes = dump_step.as_bytes();
        let dump_step_off = header_len;
        let total = dump_step_off + dump_step_bytes.len();

        let mut bytes = vec![0u8; total];
        bytes[dump_step_off..].copy_from_slice(dump_step_bytes);

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = MarkStepHeader {
            group_total_count, group_index, group_policy,
            is_head: is_head as u32,
            global_step_addr,
            dump_step_ptr: base + dump_step_off as u64,
            dump_step_len: dump_step_bytes.len() as u32,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskMarkStep { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskMarkStep {
    fn kernel_name(&self) -> &'static str { "markStep" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

// -- zero copy ---------------------------------------------------------------

/// Describes one src→dst address remap entry for `cpuZeroCpy[V2]`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AddrMapInfoKernelArgs {
    pub src_addr: u64,
    pub dst_addr: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ZeroCopyHeader {
    addr_num: u32,
    src_addr_list_ptr: u64,
    dst_addr_list_ptr: u64,
}

pub struct SchedTaskZeroCopy {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskZeroCopy {
    /// `SchedTaskZeroCopy::init(src_addrs, dst_addrs)`: rewrites virtual
    /// addresses inside an Mbuf for in-place output delivery.
    pub fn init(task_id: u64, src_addrs: &[u64], dst_addrs: &[u64]) -> Result<SchedTaskZeroCopy> {
        assert_eq!(src_addrs.len(), dst_addrs.len());
        let header_len = size_of::<ZeroCopyHeader>();
        let src_off = header_len;
        let src_len = src_addrs.len() * 8;
        let dst_off = src_off + src_len;
        let dst_len = dst_addrs.len() * 8;
        let total = dst_off + dst_len;

        let mut bytes = vec![0u8; total];
        for (i, v) in src_addrs.iter().enumerate() {
            bytes[src_off + i * 8..src_off + i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }
        for (i, v) in dst_addrs.iter().enumerate() {
            bytes[dst_off + i * 8..dst_off + i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = ZeroCopyHeader {
            addr_num: src_addrs.len() as u32,
            src_addr_list_ptr: base + src_off as u64,
            dst_addr_list_ptr: base + dst_off as u64,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskZeroCopy { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskZeroCopy {
    fn kernel_name(&self) -> &'static str { "cpuZeroCpy" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

/// `cpuZeroCpyV2`: per-slot tiling / fusion-offset aware variant. Takes the
/// same address pairs as [`SchedTaskZeroCopy`] plus a fusion-offset per
/// entry and a tiling flag per entry.
#[repr(C)]
#[derive(Clone, Copy)]
struct ZeroCopyV2Header {
    addr_num: u32,
    src_addr_list_ptr: u64,
    dst_addr_list_ptr: u64,
    no_tiling_list_ptr: u64,
    dest_is_tiling_list_ptr: u64,
    fusion_offsets_list_ptr: u64,
}

pub struct SchedTaskZeroCopyV2 {
    task_id: u64,
    block: DeviceArgBlock,
}

impl SchedTaskZeroCopyV2 {
    pub fn init(task_id: u64, addrs: &[AddrMapInfoKernelArgs], no_tiling: &[bool],
            dest_is_tiling: &[bool], fusion_offsets: &[i64]) -> Result<SchedTaskZeroCopyV2> {
        let n = addrs.len();
        assert_eq!(no_tiling.len(), n);
        assert_eq!(dest_is_tiling.len(), n);
        assert_eq!(fusion_offsets.len(), n);

        let header_len = size_of::<ZeroCopyV2Header>();
        let src_off = header_len;
        let src_len = n * 8;
        let dst_off = src_off + src_len;
        let dst_len = n * 8;
        let no_tiling_off = dst_off + dst_len;
        let no_tiling_len = n;
        let dest_tiling_off = no_tiling_off + no_tiling_len;
        let dest_tiling_len = n;
        let fusion_off = dest_tiling_off + dest_tiling_len;
        let fusion_len = n * 8;
        let total = fusion_off + fusion_len;

        let mut bytes = vec![0u8; total];
        for (i, a) in addrs.iter().enumerate() {
            bytes[src_off + i * 8..src_off + i * 8 + 8].copy_from_slice(&a.src_addr.to_le_bytes());
            bytes[dst_off + i * 8..dst_off + i * 8 + 8].copy_from_slice(&a.dst_addr.to_le_bytes());
        }
        for i in 0..n {
            bytes[no_tiling_off + i] = no_tiling[i] as u8;
            bytes[dest_tiling_off + i] = dest_is_tiling[i] as u8;
            bytes[fusion_off + i * 8..fusion_off + i * 8 + 8].copy_from_slice(&fusion_offsets[i].to_le_bytes());
        }

        let block = DeviceArgBlock::upload(&bytes)?;
        let base = block.device_addr();
        let header = ZeroCopyV2Header {
            addr_num: n as u32,
            src_addr_list_ptr: base + src_off as u64,
            dst_addr_list_ptr: base + dst_off as u64,
            no_tiling_list_ptr: base + no_tiling_off as u64,
            dest_is_tiling_list_ptr: base + dest_tiling_off as u64,
            fusion_offsets_list_ptr: base + fusion_off as u64,
        };
        bytes[..header_len].copy_from_slice(bytes_of(&header));
        block.rewrite(&bytes)?;

        Ok(SchedTaskZeroCopyV2 { task_id, block })
    }
}

impl SchedTaskInfo for SchedTaskZeroCopyV2 {
    fn kernel_name(&self) -> &'static str { "cpuZeroCpyV2" }
    fn task_id(&self) -> u64 { self.task_id }
    fn arg_block(&self) -> &DeviceArgBlock { &self.block }
}

/// Monotonic per-builder task-id allocator, mirroring the source's counter
/// that tags each emitted `SchedTaskInfo` for ordering diagnostics.
#[derive(Default)]
pub struct TaskIdAllocator(u64);

impl TaskIdAllocator {
    pub fn new() -> TaskIdAllocator {
        TaskIdAllocator(0)
    }

    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_task_round_trips_kernel_name() {
        let task = SchedTaskActiveModel::new(1, 42).unwrap();
        assert_eq!(task.kernel_name(), "activeModel");
        assert_eq!(task.task_id(), 1);
    }

    #[test]
    fn batch_dequeue_self_referential_pointers_land_inside_block() {
        let task = SchedTaskModelBatchDequeue::new(2, 0, &[0, 0], &[10, 11]).unwrap();
        let base = task.arg_block().device_addr();
        assert!(base > 0);
        assert_eq!(task.kernel_name(), "modelBatchDequeue");
    }

    #[test]
    fn task_id_allocator_is_monotonic() {
        let mut alloc = TaskIdAllocator::new();
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
        assert_eq!(alloc.next(), 3);
    }
}
