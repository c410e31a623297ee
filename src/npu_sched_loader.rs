//! `NpuSchedModelLoader` — the nine-step `LoadModel` sequence that stands a
//! dynamic model up on the device: streams, request/response queues, the
//! input/output marshaling tasks, and the notify handshake with the host
//! proxy dispatcher that actually runs the model body.

use std::sync::atomic::{AtomicU32, Ordering};

use gehete_drv_core::{self as core, Stream};

use crate::error::Result;
use crate::sched_task::{
    SchedTaskInfo, SchedTaskMarkStep, SchedTaskModelDequeue,
    SchedTaskModelEnqueue, SchedTaskNotifyRecord, SchedTaskNotifyWait,
    SchedTaskPostprocessDynamicOutput, SchedTaskPostprocessDynamicOutputV2,
    SchedTaskPrepareDynamicInputOutput, SchedTaskPrepareDynamicInputOutputV2,
    SchedTaskStreamRepeat, SchedTaskZeroCopy, TaskIdAllocator,
};

static NEXT_RUNTIME_MODEL_ID: AtomicU32 = AtomicU32::new(1);

fn allocate_runtime_model_id() -> u32 {
    NEXT_RUNTIME_MODEL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Per-input/output size descriptors known at load time.
#[derive(Debug, Clone)]
pub struct LoadModelSpec {
    pub device_id: i32,
    pub input_queues: Vec<u32>,
    pub input_sizes: Vec<u64>,
    pub output_sizes: Vec<u64>,
    pub output_queues: Vec<u32>,
    /// Addresses to rewrite in-place via `cpuZeroCpy` before delivering the
    /// response, empty when the model has no zero-copy outputs.
    pub zero_copy_src_addrs: Vec<u64>,
    pub zero_copy_dst_addrs: Vec<u64>,
    pub skip_mark_step: bool,
    pub group_total_count: u32,
    pub group_index: u32,
    pub group_policy: u32,
    pub dump_step: String,
    pub global_step_addr: u64,
    /// Whether the loaded firmware accepts `postprocessDynamicOutputV2`.
    /// The driver layer has no kernel-capability query, so callers supply
    /// this from whatever capability probe their deployment already runs.
    pub supports_postprocess_v2: bool,
}

/// Streams and queues a loaded model owns, plus its runtime model id.
pub struct LoadedModel {
    pub runtime_model_id: u32,
    pub entry_stream: Stream,
    pub next_stream: Stream,
    pub scheduler_stream: Stream,
    pub request_queue_id: u32,
    pub response_queue_id: u32,
    tasks: Vec<Box<dyn SchedTaskInfo>>,
}

impl LoadedModel {
    pub fn distribute_all(&self) -> Result<()> {
        for task in &self.tasks {
            task.distribute(self.scheduler_stream)?;
        }
        Ok(())
    }
}

unsafe impl Send for LoadedModel {}

/// Stands a dynamic model up on the device following the nine-step sequence
/// the source's model loader runs before the first inference can execute.
pub struct NpuSchedModelLoader {
    task_ids: TaskIdAllocator,
}

impl NpuSchedModelLoader {
    pub fn new() -> NpuSchedModelLoader {
        NpuSchedModelLoader { task_ids: TaskIdAllocator::new() }
    }

    pub fn load_model(&mut self, spec: &LoadModelSpec) -> Result<LoadedModel> {
        // 1. allocate runtime_model_id
        let runtime_model_id = allocate_runtime_model_id();

        // 2. entry/next/scheduler streams
        let entry_stream = core::stream_create()?;
        let next_stream = core::stream_create()?;
        let scheduler_stream = core::stream_create()?;

        // 3. request/response queues
        let request_queue_id = core::create_queue(
            spec.device_id,
            &format!("gehete_model_{}_req", runtime_model_id),
            2,
            false,
        )?;
        let response_queue_id = core::create_queue(
            spec.device_id,
            &format!("gehete_model_{}_resp", runtime_model_id),
            2,
            false,
        )?;

        let mut tasks: Vec<Box<dyn SchedTaskInfo>> = Vec::new();

        // 4. per-input dequeue task
        for &queue_id in &spec.input_queues {
            tasks.push(Box::new(SchedTaskModelDequeue::new(self.task_ids.next(), queue_id, 0)?));
        }

        // 5. prepareDynamicInputOutput[V2]
        if spec.supports_postprocess_v2 {
            tasks.push(Box::new(SchedTaskPrepareDynamicInputOutputV2::new(self.task_ids.next(), &spec.input_sizes)?));
        } else {
            tasks.push(Box::new(SchedTaskPrepareDynamicInputOutput::new(self.task_ids.next(), &spec.input_sizes, &spec.output_sizes)?));
        }

        // 6. notifyRecord -> modelEnqueue(req) -> notifyWait handshake with the
        // host proxy dispatcher that owns the request/response queue pair.
        let notify_id = runtime_model_id;
        tasks.push(Box::new(SchedTaskNotifyRecord::new(self.task_ids.next(), notify_id, 0)?));
        tasks.push(Box::new(SchedTaskModelEnqueue::new(self.task_ids.next(), request_queue_id, 0)?));
        tasks.push(Box::new(SchedTaskNotifyWait::new(self.task_ids.next(), notify_id)?));

        // 7. postprocessDynamicOutput[V2]
        if spec.supports_postprocess_v2 {
            tasks.push(Box::new(SchedTaskPostprocessDynamicOutputV2::new(
                self.task_ids.next(),
                spec.input_queues.len() as u32,
                &spec.output_sizes,
            )?));
        } else {
            tasks.push(Box::new(SchedTaskPostprocessDynamicOutput::new(
                self.task_ids.next(),
                spec.input_queues.len() as u32,
                &spec.output_sizes,
            )?));
        }

        // optional cpuZeroCpy
        if !spec.zero_copy_src_addrs.is_empty() {
            tasks.push(Box::new(SchedTaskZeroCopy::init(
                self.task_ids.next(),
                &spec.zero_copy_src_addrs,
                &spec.zero_copy_dst_addrs,
            )?));
        }

        // per-output modelEnqueue
        for &queue_id in &spec.output_queues {
            tasks.push(Box::new(SchedTaskModelEnqueue::new(self.task_ids.next(), queue_id, 0)?));
        }

        // markStep unless skip_mark_step
        if !spec.skip_mark_step {
            tasks.push(Box::new(SchedTaskMarkStep::new(
                self.task_ids.next(),
                spec.group_total_count,
                spec.group_index,
                spec.group_policy,
                &spec.dump_step,
                spec.global_step_addr,
                true,
            )?));
        }

        // 9. streamRepeat
        tasks.push(Box::new(SchedTaskStreamRepeat::new(self.task_ids.next(), runtime_model_id, 0)?));

        Ok(LoadedModel {
            runtime_model_id,
            entry_stream,
            next_stream,
            scheduler_stream,
            request_queue_id,
            response_queue_id,
            tasks,
        })
    }
}

impl Default for NpuSchedModelLoader {
    fn default() -> NpuSchedModelLoader {
        NpuSchedModelLoader::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LoadModelSpec {
        LoadModelSpec {
            device_id: 0,
            input_queues: vec![1],
            input_sizes: vec![1024],
            output_sizes: vec![2048],
            output_queues: vec![2],
            zero_copy_src_addrs: vec![],
            zero_copy_dst_addrs: vec![],
            skip_mark_step: false,
            group_total_count: 0,
            group_index: 0,
            group_policy: 0,
            dump_step: String::new(),
            global_step_addr: 0,
            supports_postprocess_v2: false,
        }
    }

    #[test]
    fn load_model_allocates_distinct_runtime_ids() {
        let mut loader = NpuSchedModelLoader::new();
        let a = loader.load_model(&spec()).unwrap();
        let b = loader.load_model(&spec()).unwrap();
        assert_ne!(a.runtime_model_id, b.runtime_model_id);
        assert_ne!(a.request_queue_id, b.request_queue_id);
    }

    #[test]
    fn v2_capability_flag_selects_v2_postprocess_task() {
        let mut loader = NpuSchedModelLoader::new();
        let mut s = spec();
        s.supports_postprocess_v2 = true;
        let model = loader.load_model(&s).unwrap();
        assert!(!model.tasks.is_empty());
    }
}
